//! # gridopf-core: Network model for optimal power flow
//!
//! Holds the element tables an optimization run reads from and writes back
//! to, in the shape of a tabular grid model:
//!
//! - **AC equipment**: voltage levels, buses, generators, batteries, loads,
//!   lines, two- and three-winding transformers, shunt compensators, static
//!   VAR compensators, dangling lines
//! - **HVDC**: VSC converter stations and the HVDC lines between them
//! - **DC sub-networks**: DC nodes, DC lines, DC grounds and voltage-source
//!   converters
//! - **Side tables**: reactive capability curve points keyed by `(id, num)`,
//!   permanent current limits keyed by `(branch id, side)`, a slack bus marker
//!
//! ## Reading and writing
//!
//! Snapshots (`get_*`) return owned rows, with bus and DC node component
//! numbers computed on the fly by [`topology`]. Writes go through one batched
//! `update_*` call per family. Both honor the per-unit view, which is toggled
//! with [`Network::set_per_unit`] or, preferably, held for a scope with
//! [`PerUnitScope`].
//!
//! ```rust
//! use gridopf_core::*;
//!
//! let mut network = Network::new();
//! network.voltage_levels.push(VoltageLevel {
//!     id: "VL1".into(),
//!     nominal_v: 225.0,
//!     ..VoltageLevel::default()
//! });
//! network.buses.push(Bus {
//!     id: "B1".into(),
//!     voltage_level_id: "VL1".into(),
//!     v_mag: 225.0,
//!     ..Bus::default()
//! });
//!
//! let scope = PerUnitScope::new(&mut network);
//! let buses = scope.get_buses();
//! assert_eq!(buses[0].v_mag, 1.0);
//! assert_eq!(buses[0].synchronous_component, Some(0));
//! ```

pub mod diagnostics;
pub mod elements;
pub mod error;
pub mod network;
pub mod topology;
pub mod units;

pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use elements::*;
pub use error::{GridError, GridResult};
pub use network::*;
pub use topology::{compute_components, ComponentNumbering};
pub use units::{PerUnitBase, NOMINAL_APPARENT_POWER};
