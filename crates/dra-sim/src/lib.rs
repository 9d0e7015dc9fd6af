//! DRA818 Simulation Library
//!
//! A virtual module for exercising controller code without hardware:
//!
//! - **VirtualModule**: answers AT command lines with protocol-accurate replies
//! - **run_virtual_module_task**: actor that serves a `VirtualModule` over an async stream
//!
//! # Example
//!
//! ```rust
//! use dra_sim::VirtualModule;
//!
//! let mut module = VirtualModule::new("bench", "DRA818V");
//! module.set_signal("145.5000".parse().unwrap(), true);
//!
//! let reply = module.process_line("S+145.5000").unwrap();
//! assert_eq!(reply.to_string(), "S=0");
//! ```

pub mod module;
pub mod task;

pub use module::{ModuleState, VirtualModule, VirtualModuleConfig, RECEIVED_HISTORY};
pub use task::{run_virtual_module_task, VirtualModuleCommand};
