#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// #![warn(clippy::cargo)]

// Link the BLAS/LAPACK backend selected in Cargo.toml.
extern crate blas_src;

pub mod bootstrap;
pub mod combine;
pub mod config;
pub mod dataset;
pub mod error;
pub mod kinetics;
pub mod math;
pub(crate) mod odr;
pub mod powerlaw;
pub mod sampling;

pub use error::Error;

pub type Result<T> = ::std::result::Result<T, Error>;
