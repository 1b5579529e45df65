//! Subcommand implementations and output rendering.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use meshlink_control::{MeshConfig, MeshRegistry};
use meshlink_core::DeviceUuid;
use meshlink_store::{NodeRecord, OobImportMode, OobPair, RocksStore, Scene, Store};
use serde::Serialize;

/// Open the registry database.
pub fn open(data_dir: &Path) -> anyhow::Result<Arc<RocksStore>> {
    let store = RocksStore::open(data_dir)
        .with_context(|| format!("opening registry at {}", data_dir.display()))?;
    Ok(Arc::new(store))
}

fn parse_uuid(raw: &str) -> anyhow::Result<DeviceUuid> {
    DeviceUuid::from_hex(&raw.replace('-', "")).with_context(|| format!("invalid device UUID {raw}"))
}

fn parse_oob(raw: &str) -> anyhow::Result<Vec<u8>> {
    let oob = hex::decode(raw).with_context(|| format!("invalid OOB value {raw}"))?;
    if oob.is_empty() || oob.len() > 16 {
        bail!("OOB value must be 1 to 16 bytes, got {}", oob.len());
    }
    Ok(oob)
}

/// Stored nodes, optionally only those not known to be offline.
pub fn nodes(store: &Arc<RocksStore>, online: bool) -> anyhow::Result<Vec<NodeRecord>> {
    let registry = MeshRegistry::load(Arc::clone(store))?;
    let nodes = if online {
        registry.online_nodes().cloned().collect()
    } else {
        registry.nodes().to_vec()
    };
    Ok(nodes)
}

/// Stored scenes.
pub fn scenes(store: &Arc<RocksStore>) -> anyhow::Result<Vec<Scene>> {
    Ok(store.list_scenes()?)
}

/// The address the next provisioned device will receive.
pub fn cursor(store: Arc<RocksStore>) -> anyhow::Result<u16> {
    let mut registry = MeshRegistry::load(store)?;
    let next = registry
        .next_provision_address()
        .context("unicast address space exhausted")?;
    Ok(next.get())
}

fn put_oob(
    store: &RocksStore,
    uuid: DeviceUuid,
    oob: Vec<u8>,
    import_mode: OobImportMode,
) -> anyhow::Result<OobPair> {
    let pair = OobPair {
        device_uuid: uuid,
        oob,
        import_mode,
        imported_at: Utc::now(),
    };
    store.put_oob(&pair)?;
    Ok(pair)
}

/// Store one OOB value typed in by an operator.
pub fn import_oob(store: &RocksStore, uuid: &str, oob: &str) -> anyhow::Result<OobPair> {
    let pair = put_oob(store, parse_uuid(uuid)?, parse_oob(oob)?, OobImportMode::Manual)?;
    tracing::info!(uuid = %pair.device_uuid, "OOB value imported");
    Ok(pair)
}

/// Store every `<uuid> <oob>` line of an import file.
///
/// Blank lines and lines starting with `#` are skipped. The whole file is
/// validated before anything is written.
pub fn import_oob_file(store: &RocksStore, contents: &str) -> anyhow::Result<Vec<OobPair>> {
    let mut parsed = Vec::new();
    for (number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(uuid), Some(oob), None) = (fields.next(), fields.next(), fields.next()) else {
            bail!("line {}: expected `<uuid> <oob>`", number + 1);
        };
        let uuid = parse_uuid(uuid).with_context(|| format!("line {}", number + 1))?;
        let oob = parse_oob(oob).with_context(|| format!("line {}", number + 1))?;
        parsed.push((uuid, oob));
    }

    let pairs = parsed
        .into_iter()
        .map(|(uuid, oob)| put_oob(store, uuid, oob, OobImportMode::File))
        .collect::<anyhow::Result<Vec<_>>>()?;
    tracing::info!(count = pairs.len(), "OOB file imported");
    Ok(pairs)
}

/// Every stored OOB value.
pub fn list_oob(store: &RocksStore) -> anyhow::Result<Vec<OobPair>> {
    Ok(store.list_oob()?)
}

/// The OOB value of one device.
pub fn show_oob(store: &RocksStore, uuid: &str) -> anyhow::Result<OobPair> {
    let uuid = parse_uuid(uuid)?;
    store
        .get_oob(&uuid)?
        .with_context(|| format!("no OOB value stored for {uuid}"))
}

/// Forget the OOB value of one device.
pub fn remove_oob(store: &RocksStore, uuid: &str) -> anyhow::Result<()> {
    let uuid = parse_uuid(uuid)?;
    store.delete_oob(&uuid)?;
    Ok(())
}

// =============================================================================
// Output
// =============================================================================

/// Renders results as text or JSON on stdout.
pub struct Output {
    json: bool,
}

impl Output {
    pub const fn new(json: bool) -> Self {
        Self { json }
    }

    fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    pub fn nodes(&self, nodes: &[NodeRecord]) -> anyhow::Result<()> {
        if self.json {
            return Self::print_json(nodes);
        }
        for node in nodes {
            let groups: Vec<String> = node.subscriptions.iter().map(ToString::to_string).collect();
            println!(
                "{}  {}  {} el  {:<7}  {}{}{}",
                node.unicast_address,
                node.device_uuid,
                node.element_count,
                node.on_off_description(),
                node.product_description(),
                if node.is_low_power() { "  lpn" } else { "" },
                if groups.is_empty() {
                    String::new()
                } else {
                    format!("  groups {}", groups.join(","))
                },
            );
        }
        Ok(())
    }

    pub fn scenes(&self, scenes: &[Scene]) -> anyhow::Result<()> {
        if self.json {
            return Self::print_json(scenes);
        }
        for scene in scenes {
            println!("scene {}", scene.id);
            for state in &scene.states {
                println!(
                    "  {}  {:<7}  lightness {}%  temperature {}%",
                    state.address,
                    state.on_off.description(),
                    state.lightness,
                    state.temperature
                );
            }
        }
        Ok(())
    }

    pub fn oob(&self, pairs: &[OobPair]) -> anyhow::Result<()> {
        if self.json {
            return Self::print_json(pairs);
        }
        for pair in pairs {
            println!(
                "{}  {}  {:?}  {}",
                pair.device_uuid,
                hex::encode(&pair.oob),
                pair.import_mode,
                pair.imported_at.to_rfc3339()
            );
        }
        Ok(())
    }

    pub fn cursor(&self, next: u16) -> anyhow::Result<()> {
        if self.json {
            return Self::print_json(&serde_json::json!({ "next_provision_address": next }));
        }
        println!("0x{next:04X}");
        Ok(())
    }

    pub fn config(&self, config: &MeshConfig) -> anyhow::Result<()> {
        if self.json {
            return Self::print_json(config);
        }
        println!("scan timeout          {}s", config.scan_timeout_seconds);
        println!("publish timeout       {}s", config.publish_timeout_seconds);
        println!("time publish period   {}ms", config.time_publish_period_ms);
        println!("time publish address  0x{:04X}", config.time_publish_address);
        println!("fast bind             {}", config.fast_bind_enabled);
        println!("auto no-oob           {}", config.auto_use_no_oob);
        println!("online status         {}", config.online_status_enabled);
        println!("auto advance          {}", config.auto_advance);
        Ok(())
    }
}
