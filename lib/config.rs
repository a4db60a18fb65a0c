use std::env;
use std::time::Duration;

// Environment variables for configuration
// OSC_QUERY_TIMEOUT_MS: How long a query waits for a reply (default: 5000)
// OSC_QUERY_RESEND_MS: Probe resend interval while a query waits (default: 50)
// OSC_EFFECT_TICK_MS: Update rate of fade/sin/tri effects (default: 20)
// OSC_FADE_LEVEL: Target level of "@fade <d> <addr> in" (default: 0.75)
// OSC_PRINT_BUFFERS: Print blobs as hex instead of <NB> (default: off)
// OSC_TIMESTAMPS: Prefix inbound messages with local time (default: off)

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_QUERY_RESEND: Duration = Duration::from_millis(50);
pub const DEFAULT_EFFECT_TICK: Duration = Duration::from_millis(20);
pub const DEFAULT_FADE_LEVEL: f32 = 0.75;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub query_timeout: Duration,
    pub query_resend: Duration,
    pub effect_tick: Duration,
    pub fade_level: f32,
    pub print_buffers: bool,
    pub timestamps: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            query_resend: DEFAULT_QUERY_RESEND,
            effect_tick: DEFAULT_EFFECT_TICK,
            fade_level: DEFAULT_FADE_LEVEL,
            print_buffers: false,
            timestamps: false,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let millis = |name: &str, default: Duration| {
            lookup(name)
                .and_then(|s| s.trim().parse::<u64>().ok())
                .filter(|&ms| ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        let fade_level = lookup("OSC_FADE_LEVEL")
            .and_then(|s| s.trim().parse::<f32>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(DEFAULT_FADE_LEVEL);

        SessionConfig {
            query_timeout: millis("OSC_QUERY_TIMEOUT_MS", DEFAULT_QUERY_TIMEOUT),
            query_resend: millis("OSC_QUERY_RESEND_MS", DEFAULT_QUERY_RESEND),
            effect_tick: millis("OSC_EFFECT_TICK_MS", DEFAULT_EFFECT_TICK),
            fade_level,
            print_buffers: lookup("OSC_PRINT_BUFFERS").map(|s| is_switch_on(&s)).unwrap_or(false),
            timestamps: lookup("OSC_TIMESTAMPS").map(|s| is_switch_on(&s)).unwrap_or(false),
        }
    }
}

/// On/off switches accept `on`, `true`, `1` and `yes`; anything else is off.
pub fn is_switch_on(value: &str) -> bool {
    matches!(value.trim(), "on" | "true" | "1" | "yes")
}
