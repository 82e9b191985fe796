use std::{error::Error, fmt, io};

use comms::CommErr;
use sharding::ShardingErr;

/// The pipeline module's result type.
pub type Result<T> = std::result::Result<T, PipelineErr>;

/// Training pipeline runtime failures.
///
/// Data exhaustion is deliberately not represented here; it is a normal
/// termination signal reported through `StepOutcome::Done`.
#[derive(Debug)]
pub enum PipelineErr {
    /// A collective exchange failed; the transport error is preserved as-is.
    Comm(CommErr),
    /// A bad plan detected while preparing this rank's pipeline inputs.
    Sharding(ShardingErr),
    Io(io::Error),
    UnknownFeature {
        feature: String,
    },
    DuplicateFeature {
        feature: String,
    },
    IdOutOfRange {
        table: String,
        id: u64,
        rows: usize,
    },
    MissingWeights {
        table: String,
    },
    Compute {
        table: String,
        detail: String,
    },
}

impl fmt::Display for PipelineErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineErr::Comm(e) => write!(f, "communication failed: {e}"),
            PipelineErr::Sharding(e) => write!(f, "sharding failed: {e}"),
            PipelineErr::Io(e) => write!(f, "io error: {e}"),
            PipelineErr::UnknownFeature { feature } => {
                write!(f, "feature {feature} maps to no sharded table")
            }
            PipelineErr::DuplicateFeature { feature } => {
                write!(f, "feature {feature} is claimed by more than one table")
            }
            PipelineErr::IdOutOfRange { table, id, rows } => {
                write!(f, "id {id} is outside table {table}'s {rows} rows")
            }
            PipelineErr::MissingWeights { table } => {
                write!(f, "table {table} was sharded without an initial tensor, no values to look up")
            }
            PipelineErr::Compute { table, detail } => {
                write!(f, "compute failed on table {table}: {detail}")
            }
        }
    }
}

impl Error for PipelineErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PipelineErr::Comm(e) => Some(e),
            PipelineErr::Sharding(e) => Some(e),
            PipelineErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CommErr> for PipelineErr {
    fn from(value: CommErr) -> Self {
        Self::Comm(value)
    }
}

impl From<ShardingErr> for PipelineErr {
    fn from(value: ShardingErr) -> Self {
        Self::Sharding(value)
    }
}

impl From<io::Error> for PipelineErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
