//! # trellis-conf
//!
//! Configuration for trellis applications.
//!
//! Configuration is a [`Blueprint`]: a flat, ordered mapping of dotted keys
//! (`tm.attempts`, `sqlalchemy.master.url`) to values. Nested TOML tables are
//! flattened into dotted keys, and prefixes can be viewed as dictionaries of
//! their own:
//!
//! ```
//! use trellis_conf::Blueprint;
//!
//! let blueprint = Blueprint::from_toml_str(r#"
//! debug = "true"
//!
//! [tm]
//! enabled = true
//! attempts = "3"
//! "#).unwrap();
//!
//! assert_eq!(blueprint.get_bool("debug"), Some(true));
//! assert_eq!(blueprint.get_int("tm.attempts"), Some(3));
//! assert_eq!(blueprint.view("tm.").len(), 2);
//! ```
//!
//! Values read from files are usually strings; per-key [`coerce`] functions
//! turn them into booleans, integers, floats or lists once, when the
//! configuration becomes ready.

pub mod blueprint;
pub mod coerce;

pub use blueprint::{Blueprint, BlueprintView};
pub use coerce::{Coercer, Coercions, asbool, asfloat, asint, aslist};
