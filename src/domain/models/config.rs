use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure for taskpilot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Task orchestrator settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Swarm worker pool settings
    #[serde(default)]
    pub swarm: SwarmConfig,

    /// Diagnostics recorder settings
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    /// Heuristic planner tuning
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Score weights
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Step handler backend
    #[serde(default)]
    pub handler: HandlerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OrchestratorConfig {
    /// Maximum repair iterations before a task fails
    #[serde(default = "default_iteration_limit")]
    pub iteration_limit: u32,

    /// Optional wall-clock budget per task
    #[serde(default)]
    pub max_time_ms: Option<u64>,

    /// Cancel tasks that exceed `max_time_ms` instead of only penalizing the score
    #[serde(default)]
    pub cancel_on_deadline: bool,

    /// Capacity of the progress broadcast channel
    #[serde(default = "default_event_buffer")]
    pub progress_buffer: usize,
}

const fn default_iteration_limit() -> u32 {
    10
}

const fn default_event_buffer() -> usize {
    256
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            iteration_limit: default_iteration_limit(),
            max_time_ms: None,
            cancel_on_deadline: false,
            progress_buffer: default_event_buffer(),
        }
    }
}

/// Swarm dispatcher configuration.
///
/// Parallelism is always explicit; the host CPU count is never consulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SwarmConfig {
    /// Number of agents created by `init_pool`
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Maximum concurrently working agents
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Minimum pool size a batch requires
    #[serde(default = "default_min_agents")]
    pub min_agents: usize,

    /// Per-unit timeout in milliseconds
    #[serde(default = "default_unit_timeout_ms")]
    pub unit_timeout_ms: u64,

    /// Capacity of the swarm event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

const fn default_pool_size() -> usize {
    200
}

const fn default_parallelism() -> usize {
    16
}

const fn default_min_agents() -> usize {
    10
}

const fn default_unit_timeout_ms() -> u64 {
    60_000
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            parallelism: default_parallelism(),
            min_agents: default_min_agents(),
            unit_timeout_ms: default_unit_timeout_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// Diagnostics recorder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DiagnosticsConfig {
    /// Path of the newline-delimited JSON diagnostic log
    #[serde(default = "default_diagnostics_log_path")]
    pub log_path: PathBuf,

    /// Interval between background self-checks
    #[serde(default = "default_self_check_interval_secs")]
    pub self_check_interval_secs: u64,

    /// Number of sealed sessions kept for reports
    #[serde(default = "default_recent_sessions")]
    pub recent_sessions: usize,

    /// Capacity of the diagnostics event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_diagnostics_log_path() -> PathBuf {
    PathBuf::from(".taskpilot/diagnostics/agentic-diagnostics.jsonl")
}

const fn default_self_check_interval_secs() -> u64 {
    60
}

const fn default_recent_sessions() -> usize {
    10
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            log_path: default_diagnostics_log_path(),
            self_check_interval_secs: default_self_check_interval_secs(),
            recent_sessions: default_recent_sessions(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// Keyword weights and thresholds for the complexity heuristic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PlannerConfig {
    /// create / build / implement / develop
    #[serde(default = "default_build_weight")]
    pub build_weight: u32,

    /// refactor / optimize / improve
    #[serde(default = "default_refine_weight")]
    pub refine_weight: u32,

    /// debug / fix / solve
    #[serde(default = "default_repair_weight")]
    pub repair_weight: u32,

    /// test / verify / validate
    #[serde(default = "default_check_weight")]
    pub check_weight: u32,

    /// Added per extra part joined by and / then / also / plus
    #[serde(default = "default_conjunct_weight")]
    pub conjunct_weight: u32,

    /// Highest score still classified simple
    #[serde(default = "default_simple_max")]
    pub simple_max: u32,

    /// Highest score still classified moderate
    #[serde(default = "default_moderate_max")]
    pub moderate_max: u32,

    /// Highest score still classified complex
    #[serde(default = "default_complex_max")]
    pub complex_max: u32,

    /// Time estimate per planned step
    #[serde(default = "default_step_time_estimate_ms")]
    pub step_time_estimate_ms: u64,
}

const fn default_build_weight() -> u32 {
    3
}

const fn default_refine_weight() -> u32 {
    2
}

const fn default_repair_weight() -> u32 {
    2
}

const fn default_check_weight() -> u32 {
    1
}

const fn default_conjunct_weight() -> u32 {
    1
}

const fn default_simple_max() -> u32 {
    2
}

const fn default_moderate_max() -> u32 {
    5
}

const fn default_complex_max() -> u32 {
    8
}

const fn default_step_time_estimate_ms() -> u64 {
    5_000
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            build_weight: default_build_weight(),
            refine_weight: default_refine_weight(),
            repair_weight: default_repair_weight(),
            check_weight: default_check_weight(),
            conjunct_weight: default_conjunct_weight(),
            simple_max: default_simple_max(),
            moderate_max: default_moderate_max(),
            complex_max: default_complex_max(),
            step_time_estimate_ms: default_step_time_estimate_ms(),
        }
    }
}

/// Weights of a session score. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SessionWeights {
    pub autonomy: f64,
    pub iteration: f64,
    pub success: f64,
    pub self_correction: f64,
}

impl Default for SessionWeights {
    fn default() -> Self {
        Self {
            autonomy: 0.3,
            iteration: 0.2,
            success: 0.3,
            self_correction: 0.2,
        }
    }
}

impl SessionWeights {
    pub fn total(&self) -> f64 {
        self.autonomy + self.iteration + self.success + self.self_correction
    }

    pub fn values(&self) -> [f64; 4] {
        [self.autonomy, self.iteration, self.success, self.self_correction]
    }
}

/// Weights of the overall score. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OverallWeights {
    pub session: f64,
    pub success: f64,
    pub autonomy: f64,
    pub healing: f64,
}

impl Default for OverallWeights {
    fn default() -> Self {
        Self {
            session: 0.4,
            success: 0.3,
            autonomy: 0.2,
            healing: 0.1,
        }
    }
}

impl OverallWeights {
    pub fn total(&self) -> f64 {
        self.session + self.success + self.autonomy + self.healing
    }

    pub fn values(&self) -> [f64; 4] {
        [self.session, self.success, self.autonomy, self.healing]
    }
}

/// Scoring policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScoringConfig {
    #[serde(default)]
    pub session: SessionWeights,

    #[serde(default)]
    pub overall: OverallWeights,

    /// Iteration count at which the iteration factor saturates
    #[serde(default = "default_iteration_saturation")]
    pub iteration_saturation: f64,
}

const fn default_iteration_saturation() -> f64 {
    3.0
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            session: SessionWeights::default(),
            overall: OverallWeights::default(),
            iteration_saturation: default_iteration_saturation(),
        }
    }
}

/// Which step handler backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    Mock,
    Http,
}

/// Step handler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HandlerConfig {
    #[serde(default = "default_handler_kind")]
    pub kind: HandlerKind,

    /// Inference endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model name sent with each request
    #[serde(default = "default_model")]
    pub model: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: u64,

    /// Requests per second allowed against the endpoint
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Maximum retry attempts for transient errors
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_handler_kind() -> HandlerKind {
    HandlerKind::Mock
}

fn default_endpoint() -> String {
    "http://localhost:11441/api/chat".to_string()
}

fn default_model() -> String {
    "default".to_string()
}

const fn default_request_timeout_ms() -> u64 {
    10_000
}

const fn default_requests_per_second() -> u32 {
    10
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    250
}

const fn default_max_backoff_ms() -> u64 {
    5_000
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            kind: default_handler_kind(),
            endpoint: default_endpoint(),
            model: default_model(),
            timeout_ms: default_request_timeout_ms(),
            requests_per_second: default_requests_per_second(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Rotation policy: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
