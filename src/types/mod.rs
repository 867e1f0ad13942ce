mod events;
mod options;

pub use events::{CompletionPayload, InvokeRequest, ProcessEvent, RunId, StreamChannel, StreamPayload};
pub use options::{EffortLevel, Provider};
