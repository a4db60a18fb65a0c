// Continuous value generators driven by the scheduler
use std::f32::consts::PI;
use std::sync::Arc;
use std::time::Duration;

use osc_core::{OscArg, OscMessage};
use tracing::warn;

use crate::error::{Result, SessionError};
use crate::link::Link;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Waveform {
    /// Linear ramp, finished once `duration` has elapsed.
    Fade { from: f32, to: f32, duration: Duration },
    Sine { min: f32, max: f32, period: Duration },
    Triangle { min: f32, max: f32, period: Duration },
}

impl Waveform {
    pub fn value_at(&self, elapsed: Duration) -> f32 {
        match *self {
            Waveform::Fade { from, to, duration } => {
                let progress = ratio(elapsed, duration).min(1.0);
                from + (to - from) * progress
            }
            Waveform::Sine { min, max, period } => {
                let phase = ratio(elapsed, period);
                min + (max - min) * (0.5 + 0.5 * (2.0 * PI * phase).sin())
            }
            Waveform::Triangle { min, max, period } => {
                let phase = ratio(elapsed, period);
                min + 2.0 * (max - min) * (phase - (0.5 + phase).floor()).abs()
            }
        }
    }

    pub fn is_finished(&self, elapsed: Duration) -> bool {
        match *self {
            Waveform::Fade { duration, .. } => elapsed >= duration,
            Waveform::Sine { .. } | Waveform::Triangle { .. } => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Waveform::Fade { .. } => "fade",
            Waveform::Sine { .. } => "sin",
            Waveform::Triangle { .. } => "tri",
        }
    }
}

fn ratio(elapsed: Duration, span: Duration) -> f32 {
    if span.is_zero() {
        return 1.0;
    }
    elapsed.as_secs_f32() / span.as_secs_f32()
}

/// Where a fade starts and ends, before live values are known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FadeSpec {
    /// 0 up to the reference level.
    In,
    /// Current value down to 0.
    Out,
    /// Current value to the given level.
    To(f32),
    Between(f32, f32),
}

impl FadeSpec {
    /// `in`, `out`, `to <x>` or `<from> <to>`.
    pub fn parse(mode: &str, target: Option<&str>) -> Result<Self> {
        let level = |s: &str| {
            s.parse::<f32>().map_err(|_| SessionError::InvalidValue {
                tag: 'f',
                value: s.to_string(),
            })
        };

        match (mode, target) {
            ("in", _) => Ok(FadeSpec::In),
            ("out", _) => Ok(FadeSpec::Out),
            ("to", Some(to)) => Ok(FadeSpec::To(level(to)?)),
            ("to", None) => Err(SessionError::MissingArgument),
            (from, Some(to)) => Ok(FadeSpec::Between(level(from)?, level(to)?)),
            (_, None) => Err(SessionError::MissingArgument),
        }
    }

    pub fn needs_current_value(&self) -> bool {
        matches!(self, FadeSpec::Out | FadeSpec::To(_))
    }

    /// Concrete endpoints. `current` is only consulted for `out` and `to`.
    pub fn resolve<F>(&self, reference_level: f32, current: F) -> Result<(f32, f32)>
    where
        F: FnOnce() -> Result<f32>,
    {
        match *self {
            FadeSpec::In => Ok((0.0, reference_level)),
            FadeSpec::Out => Ok((current()?, 0.0)),
            FadeSpec::To(to) => Ok((current()?, to)),
            FadeSpec::Between(from, to) => Ok((from, to)),
        }
    }
}

/// Scheduler callback sending one float per tick to `address`. A fade
/// sends its exact end value last. A failed send ends the effect.
pub fn effect_tick(
    link: Arc<Link>,
    address: String,
    waveform: Waveform,
) -> impl FnMut(Duration) -> bool + Send + 'static {
    move |elapsed| {
        let finished = waveform.is_finished(elapsed);
        let value = waveform.value_at(elapsed);
        let message = OscMessage::new(&address, vec![OscArg::Float(value)]);

        if let Err(e) = link.send(&message) {
            warn!(address = %address, effect = waveform.name(), error = %e, "effect stopped");
            return false;
        }
        !finished
    }
}
