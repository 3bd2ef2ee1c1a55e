//! Storage layout, agent endpoint and binding constants.

/// Default storage key prefix under which workload records live.
pub const DEFAULT_KEY_PREFIX: &str = "/registry/workloads";

/// Default port the execution-host agent serves logs and proxy traffic on.
pub const DEFAULT_AGENT_PORT: u16 = 10250;

/// Default URL scheme used to reach the execution-host agent.
pub const DEFAULT_AGENT_SCHEME: &str = "http";

/// Default number of compare-and-swap attempts before a version race is
/// reported as a conflict.
pub const DEFAULT_MAX_UPDATE_ATTEMPTS: u32 = 10;

/// Default deadline for a single storage round trip, in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

/// Target kinds a binding may name. An empty kind is also accepted.
pub const HOST_KIND_ALIASES: [&str; 2] = ["Node", "Minion"];

/// Resource name used in errors raised for workload records.
pub const WORKLOAD_RESOURCE: &str = "workloads";

/// Resource name used in errors raised by the binding surface.
pub const BINDING_RESOURCE: &str = "binding";

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "WORKLOAD_REGISTRY_";
