//! Thread reconstruction
//!
//! Two independent views of a conversation are built here:
//!
//! - **Thread forest** (`builder`): a flat batch of records nested by reply
//!   reference, falling back to subject matching when the reference does not
//!   resolve. Used by the stats view.
//! - **Thread around one message** (`ancestry` + `descendants`): walk up the
//!   In-Reply-To chain to the root, then collect every visible reply below it
//!   through the record store. Used by the thread view.
//!
//! ## Module Structure
//!
//! - `subject`: subject normalization and reference parsing
//! - `builder`: arena-based forest construction and participant ranking
//! - `ancestry`: bounded upward walk
//! - `descendants`: bounded, cycle-safe downward collection

pub mod ancestry;
pub mod builder;
pub mod descendants;
pub mod subject;

pub use ancestry::find_root;
pub use builder::{MISSING_MESSAGE_ID, TOP_PARTICIPANTS, ThreadForest, build_threads};
pub use descendants::{CollectMode, Descendants, collect_descendants};
