//! Domain value types.

pub mod agent;
pub mod budget;
pub mod config;
pub mod contract;
pub mod copy;
pub mod repair;
pub mod scorecard;

pub use agent::{AgentCallResult, AgentRole, Capability, RoleConfig, RoleTable, TraceContext};
pub use budget::{BudgetCaps, BudgetCheck, BudgetState, CapKind, CostModel, ModelUse};
pub use config::{
    Config, CopyConfig, EscalationConfig, LiveTransportConfig, LoggingConfig, RepairConfig,
    ReplayConfig, ReplayMode, TransportConfig, TransportKind,
};
pub use contract::ContractName;
pub use copy::{
    CollapseOutput, CopyBrief, CopyStopReason, CopyTelemetry, Critique, Decision, DecisionRecord,
    FinalChoice, TargetKey, Variant,
};
pub use repair::{
    ArbiterDecision, ArbiterVerdict, Diagnosis, DiagnosisSummary, ExecutionReport, FailureReport,
    PatchChange, PatchOperation, PatchPlan, PatchProposal, PreflightStopReason, RepairAudit,
    RepairMeta, RepairRecord, RepairStopReason, RetryMeta, ReviewCritique, RoleModels, RunScores,
    TestCommand,
};
pub use scorecard::{AgentScoreCard, RepairObservation, TrustTrend};
