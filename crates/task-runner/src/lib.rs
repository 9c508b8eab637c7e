pub mod assemble;
pub mod block;
pub mod completion;
pub mod config;
pub mod display;
pub mod engine;
pub mod platform;
pub mod registry;
pub mod session;
pub mod store;
pub mod transport;
pub mod validate;

pub use assemble::{assemble, ExperimentSequence, RunFlags};
pub use block::{Block, ChoiceKind, FormKind};
pub use completion::{Completion, CompletionHandler, SequenceExhausted};
pub use config::{parse_overrides, ConfigError, TaskConfig};
pub use display::{DisplayEvent, DisplayTarget, RecordingDisplay};
pub use engine::{EngineHooks, Script, ScriptedEngine, TrialEngine};
pub use platform::{PlatformInfo, PlatformProvider, QueryPlatform, StaticPlatform};
pub use registry::{Assets, BlockRegistry};
pub use session::{RunOutcome, Session};
pub use store::{Envelope, ResponseStore, SubmitFormat};
pub use transport::{
    HttpTransport, RecordingTransport, RetryPolicy, SubmitError, Submitter, Transport,
    TransportError,
};
pub use validate::{validate, FormState, Verdict};
