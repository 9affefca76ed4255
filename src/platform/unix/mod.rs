pub mod interrupt;
pub mod kill;
