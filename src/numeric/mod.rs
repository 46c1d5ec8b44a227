pub mod numeric;

pub use numeric::NumericValue;
