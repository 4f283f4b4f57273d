mod asset;
pub use asset::*;

mod aspect_types;
pub use aspect_types::*;

mod aspect;
pub use aspect::*;

mod registry;
pub use registry::*;

mod job;
pub use job::*;

mod scheduler;
pub use scheduler::*;

mod decoders;
pub use decoders::*;

mod assets;
pub use assets::*;
