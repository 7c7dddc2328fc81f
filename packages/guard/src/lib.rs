pub mod injector;
pub mod validator;

pub use injector::{inject_guards, ToolSchemas};
pub use validator::{validate, ValidationResult};
