pub mod calendar;
pub mod instrument;
pub mod market;
pub mod price;
