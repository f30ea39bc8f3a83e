pub mod short_term;
pub mod long_term;
