pub mod change_proposal;
mod codec;

pub use codec::*;
