//! # Mooring Assign
//!
//! An immutable interpreter for update operators over tree-shaped documents.
//!
//! An [`UpdateOperation`] maps operators (`$set`, `$unset`, `$rename`, `$inc`,
//! `$mul`, `$min`, `$max`, `$bit`, `$currentDate`, `$push`, `$addToSet`,
//! `$pull`, `$pop`) to dotted paths and operands. [`apply`] runs it against a
//! document and returns a new one; the input is never modified and untouched
//! subtrees are shared between input and output.
//!
//! ```
//! use mooring_assign::{apply, UpdateOperation, Value};
//!
//! let doc = Value::from(serde_json::json!({ "name": "mooring", "stars": 1 }));
//! let op = UpdateOperation::new().inc("stars", 2).push("tags", "sync");
//! let next = apply(&doc, &op).unwrap();
//! assert_eq!(next.get("stars"), Some(&Value::Int(3)));
//! ```

pub mod apply;
pub mod compare;
pub mod condition;
pub mod error;
pub mod operation;
pub mod path;
pub mod restorable;
pub mod value;

pub use apply::{apply, apply_all, apply_at};
pub use compare::{compare_values, equivalent};
pub use condition::{Comparison, Condition};
pub use error::{AssignError, Result};
pub use operation::{
    BitOp, DateKind, Op, Operator, PopEnd, PushModifier, SortDirection, SortSpec, UpdateOperation,
};
pub use path::DocumentPath;
pub use restorable::{restore_via_serde, to_document_via_serde, Fields, Restorable};
pub use value::{Map, Number, Value};
