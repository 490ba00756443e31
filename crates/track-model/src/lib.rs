//! trackrefine Model
//!
//! Defines the core data contracts for trackrefine:
//! - **Table:** Per-frame `(x, y, likelihood)` columns for each landmark
//! - **CSV:** Reading flat and tracker-style headers, writing flat output
//! - **Settings:** JSON pipeline settings consumed by the refinement stages
//! - **Summary:** Audit rows describing likelihood masking per landmark
//!
//! Missing samples are NaN throughout.

pub mod csv_io;
pub mod error;
pub mod settings;
pub mod summary;
pub mod table;

pub use csv_io::*;
pub use error::*;
pub use settings::*;
pub use summary::*;
pub use table::*;
