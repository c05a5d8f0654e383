pub mod pool;
pub mod scheduler;

pub use pool::{
    CandidatePool, DedupReport, FailureWindows, HealthThresholds, HealthVerdict, MergeReport,
    SelectionPolicy, SelectionStage, SortColumn,
};
pub use pool::ranking::SortReport;
pub use pool::selection::assess_health;
pub use scheduler::{
    CandidateSource, EndpointActivator, PoolActor, PoolHandle, ProbeRunner, ResultSink,
    RoundOutcome, RoundReport, Scheduler, SchedulerConfig, SchedulerError, SchedulerMetrics,
    SchedulerStatus, TriggerCadence, TriggerOutcome, TriggerSource,
};
