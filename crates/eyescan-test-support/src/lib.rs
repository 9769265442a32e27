//! Test support utilities for eyescan.
//!
//! Provides stand-in networks with known outputs and gradients, and synthetic
//! image builders that produce both decoded images and request-ready data URLs.
//!
//! # Example
//!
//! ```
//! use eyescan_test_support::{MockModel, SyntheticImageBuilder};
//!
//! let url = SyntheticImageBuilder::png_data_url(&SyntheticImageBuilder::red_pixel());
//! let diagnoser = MockModel::binary(0.0).retinopathy();
//! ```

mod builders;
mod mocks;

pub use builders::SyntheticImageBuilder;
pub use mocks::MockModel;
