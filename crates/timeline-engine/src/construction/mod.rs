//! Timeline construction
//!
//! Turns author-facing descriptions into [`NodeSpec`](crate::node::NodeSpec)
//! trees and checks them before the engine runs anything.

pub mod description;
pub mod validator;

pub use description::{load_timeline, NodeDescription};
pub use validator::{validate, ConstructionValidator, SpecWarning, ValidationReport};
