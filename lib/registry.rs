// Type tag registry: text <-> OscArg conversion, one parser and formatter per tag
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use osc_core::OscArg;
use tracing::debug;

use crate::error::{Result, SessionError};

/// Placeholder shown for values whose tag has no formatter.
pub const PLACEHOLDER: &str = "?";

/// Consumes the tokens it needs from the front of the queue.
pub type Parser = Arc<dyn Fn(&mut VecDeque<String>) -> Result<OscArg> + Send + Sync>;

pub type Formatter = Arc<dyn Fn(&OscArg, &FormatOptions) -> String + Send + Sync>;

/// Session flags a formatter may consult.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatOptions {
    pub print_buffers: bool,
}

pub struct TypeRegistry {
    parsers: HashMap<char, Parser>,
    formatters: HashMap<char, Formatter>,
}

impl TypeRegistry {
    /// A registry with no tags at all.
    pub fn empty() -> Self {
        TypeRegistry {
            parsers: HashMap::new(),
            formatters: HashMap::new(),
        }
    }

    /// Registry preloaded with `s`, `i`, `f`, `B`, `N` parsers and the
    /// matching formatters plus `b`.
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register_parser('s', |values| Ok(OscArg::String(take(values)?)));
        registry.register_parser('i', |values| {
            let value = take(values)?;
            parse_int_or_mask(&value).map(OscArg::Int)
        });
        registry.register_parser('f', |values| {
            let value = take(values)?;
            value
                .trim()
                .parse::<f32>()
                .map(OscArg::Float)
                .map_err(|_| SessionError::InvalidValue { tag: 'f', value })
        });
        registry.register_parser('B', |values| Ok(OscArg::Bool(parse_bool(&take(values)?))));
        registry.register_parser('N', |_| Ok(OscArg::Null));

        registry.register_formatter('s', |arg, _| match arg {
            OscArg::String(s) => format!("\"{}\"", s.replace('"', "\\\"")),
            _ => PLACEHOLDER.to_string(),
        });
        registry.register_formatter('i', |arg, _| match arg {
            OscArg::Int(v) => v.to_string(),
            _ => PLACEHOLDER.to_string(),
        });
        registry.register_formatter('f', |arg, _| match arg {
            OscArg::Float(v) => v.to_string(),
            _ => PLACEHOLDER.to_string(),
        });
        registry.register_formatter('B', |arg, _| match arg {
            OscArg::Bool(true) => "true".to_string(),
            OscArg::Bool(false) => "false".to_string(),
            _ => PLACEHOLDER.to_string(),
        });
        registry.register_formatter('N', |_, _| "null".to_string());
        registry.register_formatter('b', |arg, opts| match arg {
            OscArg::Blob(data) if opts.print_buffers => to_hex(data),
            OscArg::Blob(data) => format!("<{}B>", data.len()),
            _ => PLACEHOLDER.to_string(),
        });

        registry
    }

    /// Replaces any parser already registered for `tag`.
    pub fn register_parser<F>(&mut self, tag: char, parser: F)
    where
        F: Fn(&mut VecDeque<String>) -> Result<OscArg> + Send + Sync + 'static,
    {
        self.parsers.insert(tag, Arc::new(parser));
    }

    pub fn register_formatter<F>(&mut self, tag: char, formatter: F)
    where
        F: Fn(&OscArg, &FormatOptions) -> String + Send + Sync + 'static,
    {
        self.formatters.insert(tag, Arc::new(formatter));
    }

    pub fn has_parser(&self, tag: char) -> bool {
        self.parsers.contains_key(&tag)
    }

    pub fn has_formatter(&self, tag: char) -> bool {
        self.formatters.contains_key(&tag)
    }

    pub fn parse(&self, tag: char, values: &mut VecDeque<String>) -> Result<OscArg> {
        let parser = self.parsers.get(&tag).ok_or(SessionError::UnknownTypeTag(tag))?;
        parser(values)
    }

    /// Parse one argument per character of `types`, all drawing from the
    /// same value queue. An empty type string yields no arguments.
    pub fn parse_args<I>(&self, types: &str, values: I) -> Result<Vec<OscArg>>
    where
        I: IntoIterator<Item = String>,
    {
        let mut queue: VecDeque<String> = values.into_iter().collect();
        let mut args = Vec::with_capacity(types.len());

        for tag in types.chars() {
            args.push(self.parse(tag, &mut queue)?);
        }

        if !queue.is_empty() {
            debug!(types, leftover = queue.len(), "ignoring surplus values");
        }
        Ok(args)
    }

    /// Never fails: tags without a formatter render as [`PLACEHOLDER`].
    pub fn format(&self, arg: &OscArg, opts: &FormatOptions) -> String {
        match self.formatters.get(&arg.tag()) {
            Some(formatter) => formatter(arg, opts),
            None => PLACEHOLDER.to_string(),
        }
    }

    pub fn format_args(&self, args: &[OscArg], opts: &FormatOptions) -> Vec<String> {
        args.iter().map(|arg| self.format(arg, opts)).collect()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Pop the next raw value for a parser.
pub fn take(values: &mut VecDeque<String>) -> Result<String> {
    values.pop_front().ok_or(SessionError::MissingArgument)
}

/// `f`, `false`, `off`, `n`, `no`, `0` and the empty string are false,
/// case-insensitively; everything else is true.
pub fn parse_bool(value: &str) -> bool {
    !matches!(
        value.to_ascii_lowercase().as_str(),
        "f" | "false" | "off" | "n" | "no" | "0" | ""
    )
}

/// Decimal integer, or a bit mask when prefixed with `%` (`%101` is 5).
pub fn parse_int_or_mask(value: &str) -> Result<i32> {
    let invalid = || SessionError::InvalidValue {
        tag: 'i',
        value: value.to_string(),
    };

    match value.strip_prefix('%') {
        // Full 32-bit masks are allowed, so go through u32
        Some(bits) => u32::from_str_radix(bits, 2).map(|v| v as i32).map_err(|_| invalid()),
        None => value.trim().parse::<i32>().map_err(|_| invalid()),
    }
}

fn to_hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}
