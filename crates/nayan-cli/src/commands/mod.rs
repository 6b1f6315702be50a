pub mod convert;
pub mod inspect;

mod display;
