pub mod driver;
pub mod ergast;
pub mod error;
pub mod openf1;
pub mod race;
pub mod standings;
