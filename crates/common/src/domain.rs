mod codec;
mod failure_envelope;
mod proposal;
mod result;
mod sink;
mod wire_record;

pub use codec::*;
pub use failure_envelope::*;
pub use proposal::*;
pub use result::*;
pub use sink::*;
pub use wire_record::*;
