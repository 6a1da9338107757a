pub mod config;
pub mod error;
pub mod group;
pub mod programs;
pub mod report;
pub mod status;

pub use error::{CtsError, ErrorKind};
pub use group::{TestFilter, TestGroup, TestNode};
pub use programs::{ProgramSource, ShaderStage, SourceCollections, SpirvTarget};
pub use report::{CaseResult, RunReport, Summary};
pub use status::{ResultCollector, StatusCode, TestStatus};
