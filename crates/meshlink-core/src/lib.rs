//! Core types and utilities for meshlink.
//!
//! This crate provides the foundational types used throughout the meshlink
//! onboarding stack:
//!
//! - **Addresses**: Validated unicast and group addresses plus message destinations
//! - **Identifiers**: Device UUIDs, scene numbers and application key indices
//! - **Models**: Feature identifiers (SIG and vendor model IDs) exposed by elements
//! - **Error types**: Parse and validation errors shared across crates
//!
//! # Example
//!
//! ```
//! use meshlink_core::{DeviceUuid, GroupAddress, SceneId, UnicastAddress};
//!
//! // Allocate a primary element address
//! let primary = UnicastAddress::new(0x0100).unwrap();
//! assert_eq!(primary.offset(1), Some(UnicastAddress::new(0x0101).unwrap()));
//!
//! // Groups live in their own range
//! assert!(GroupAddress::new(0xC001).is_ok());
//! assert!(GroupAddress::new(0x0001).is_err());
//!
//! // Device UUIDs come from the advertising payload
//! let uuid = DeviceUuid::from_hex("0102030405060708090a0b0c0d0e0f10").unwrap();
//! assert_eq!(uuid.as_bytes()[0], 0x01);
//!
//! // Scene number zero is reserved
//! assert!(SceneId::new(0).is_err());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod address;
pub mod error;
pub mod ids;
pub mod model;

pub use address::{Destination, GroupAddress, UnicastAddress, ALL_NODES_ADDRESS};
pub use error::{IdError, Result};
pub use ids::{AppKeyIndex, DeviceUuid, SceneId};
pub use model::ModelId;
