pub mod value;

pub use value::{Value, DATE_FORMAT};
