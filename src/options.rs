//! Command-line parsing.
//!
//! `ringpump <input> <output> [options]`. Positional tokens not starting
//! with `-` are, in order, the input and output endpoint specifications
//! (`-` alone is a positional and selects the standard stream). Options are
//! a single letter (case-insensitive) with a `=value` where one is
//! required; sizes accept the suffixes `k`, `m` and `g`.

use crate::config::DEFAULT_CAPACITY;
use crate::error::SyntaxError;

/// Default pipe buffer size for named pipe endpoints.
pub const DEFAULT_PIPE_SIZE: usize = 8192;

/// A watermark level: absolute bytes or a fraction of the ring capacity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Level {
    Bytes(usize),
    Fraction(f64),
}

/// Everything the command line can express.
#[derive(Debug, Clone)]
pub struct Options {
    pub input: String,
    pub output: String,
    /// Ring capacity in bytes (`-b`).
    pub buffer_size: usize,
    /// Preferred per-call request size (`-r`); derived from the capacity
    /// when not given.
    pub request_size: Option<usize>,
    /// Kernel pipe buffer size for named pipes (`-p`).
    pub pipe_size: usize,
    /// High watermark (`-h`): starved consumer resumes at this fill level.
    pub high_mark: Level,
    /// Low watermark (`-l`): blocked producer resumes at this fill level.
    pub low_mark: Level,
    /// Enable the OS file cache on file endpoints (`-c`).
    pub cache: bool,
    /// Emit input-side statistics (`-si`).
    pub input_stats: bool,
    /// Emit output-side statistics (`-so`).
    pub output_stats: bool,
}

impl Options {
    /// The per-call request size: explicit `-r`, or an eighth of large
    /// rings and a quarter of small ones.
    pub fn effective_request_size(&self) -> usize {
        self.request_size
            .unwrap_or(if self.buffer_size >= 256 * 1024 {
                self.buffer_size / 8
            } else {
                self.buffer_size / 4
            })
            .max(1)
    }

    /// High watermark as a fraction of the capacity.
    pub fn high_fraction(&self) -> f64 {
        self.fraction_of(self.high_mark)
    }

    /// Low watermark as a fraction of the capacity.
    pub fn low_fraction(&self) -> f64 {
        self.fraction_of(self.low_mark)
    }

    fn fraction_of(&self, level: Level) -> f64 {
        match level {
            Level::Fraction(f) => f,
            Level::Bytes(b) => b as f64 / self.buffer_size as f64,
        }
    }
}

/// Outcome of parsing a command line.
#[derive(Debug)]
pub enum Command {
    /// Both endpoints given: run the transfer.
    Run(Options),
    /// Fewer than two endpoints: print the usage text and exit 48.
    Usage { program: String },
}

/// Parses a full argument list (including the program name).
pub fn parse<I>(args: I) -> Result<Command, SyntaxError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let program = args.next().unwrap_or_else(|| "ringpump".to_owned());

    let mut input: Option<String> = None;
    let mut output: Option<String> = None;
    let mut settings = Settings::default();

    for arg in args {
        if arg.len() > 1 && arg.starts_with('-') {
            settings.apply(&arg)?;
        } else if input.is_none() {
            input = Some(normalize_separators(arg));
        } else if output.is_none() {
            output = Some(normalize_separators(arg));
        } else {
            return Err(SyntaxError::new(format!(
                "More than two I/O endpoints in the command line (at {arg})."
            )));
        }
    }

    let (Some(input), Some(output)) = (input, output) else {
        return Ok(Command::Usage { program });
    };

    settings.check_level(settings.high_mark, "high")?;
    settings.check_level(settings.low_mark, "low")?;

    Ok(Command::Run(Options {
        input,
        output,
        buffer_size: settings.buffer_size,
        request_size: settings.request_size,
        pipe_size: settings.pipe_size,
        high_mark: settings.high_mark,
        low_mark: settings.low_mark,
        cache: settings.cache,
        input_stats: settings.input_stats,
        output_stats: settings.output_stats,
    }))
}

/// Option state accumulated while walking the argument list.
#[derive(Debug)]
struct Settings {
    buffer_size: usize,
    request_size: Option<usize>,
    pipe_size: usize,
    high_mark: Level,
    low_mark: Level,
    cache: bool,
    input_stats: bool,
    output_stats: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_CAPACITY,
            request_size: None,
            pipe_size: DEFAULT_PIPE_SIZE,
            high_mark: Level::Bytes(0),
            low_mark: Level::Fraction(1.0),
            cache: false,
            input_stats: false,
            output_stats: false,
        }
    }
}

impl Settings {
    fn apply(&mut self, arg: &str) -> Result<(), SyntaxError> {
        let mut chars = arg.chars();
        let _dash = chars.next();
        let letter = chars.next().map(|c| c.to_ascii_lowercase());
        let rest = chars.as_str();

        match letter {
            Some('b') => {
                self.buffer_size = parse_positive_size(rest, "The buffer size")?;
            }
            Some('r') => {
                self.request_size = Some(parse_positive_size(rest, "The request size")?);
            }
            Some('p') => {
                self.pipe_size = parse_positive_size(rest, "The pipe buffer size")?;
            }
            Some('h') => {
                self.high_mark = parse_level(rest)?;
            }
            Some('l') => {
                self.low_mark = parse_level(rest)?;
            }
            Some('c') if rest.is_empty() => {
                self.cache = true;
            }
            Some('s') => match rest.to_ascii_lowercase().as_str() {
                "" => {
                    self.input_stats = true;
                    self.output_stats = true;
                }
                "i" => self.input_stats = true,
                "o" => self.output_stats = true,
                _ => return Err(SyntaxError::new(format!("Invalid option {arg}."))),
            },
            _ => return Err(SyntaxError::new(format!("Invalid option {arg}."))),
        }
        Ok(())
    }

    fn check_level(&self, level: Level, which: &str) -> Result<(), SyntaxError> {
        if let Level::Bytes(bytes) = level {
            if bytes > self.buffer_size {
                return Err(SyntaxError::new(format!(
                    "The {which} water mark is larger than the buffer size."
                )));
            }
        }
        Ok(())
    }
}

/// Parses `=<int>[k|m|g]` into bytes.
fn parse_size(raw: &str) -> Result<i64, SyntaxError> {
    let Some(value) = raw.strip_prefix('=') else {
        return Err(SyntaxError::new(format!(
            "'=' followed by an integer value expected. Found '{raw}'."
        )));
    };

    let split = value
        .find(|c: char| !c.is_ascii_digit() && c != '+' && c != '-')
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    let base: i64 = digits.parse().map_err(|_| {
        SyntaxError::new(format!("'=' followed by an integer value expected. Found '{raw}'."))
    })?;

    let factor: i64 = match unit {
        "" => 1,
        u if u.eq_ignore_ascii_case("k") => 1024,
        u if u.eq_ignore_ascii_case("m") => 1024 * 1024,
        u if u.eq_ignore_ascii_case("g") => 1024 * 1024 * 1024,
        _ => {
            return Err(SyntaxError::new(format!(
                "The unit '{unit}' is invalid in the integer constant '{value}'."
            )))
        }
    };

    base.checked_mul(factor)
        .ok_or_else(|| SyntaxError::new(format!("The value '{value}' is out of range.")))
}

fn parse_positive_size(raw: &str, what: &str) -> Result<usize, SyntaxError> {
    let value = parse_size(raw)?;
    if value < 1 {
        return Err(SyntaxError::new(format!("{what} must be positive.")));
    }
    Ok(value as usize)
}

/// Parses `=<level>` where a trailing `%` makes the level relative.
fn parse_level(raw: &str) -> Result<Level, SyntaxError> {
    let Some(value) = raw.strip_prefix('=') else {
        return Err(SyntaxError::new(format!(
            "'=' followed by a level value expected. Found '{raw}'."
        )));
    };

    if let Some(percent) = value.strip_suffix('%') {
        let pct: f64 = percent.parse().map_err(|_| {
            SyntaxError::new(format!(
                "'=' followed by a numeric value expected. Found '{raw}'."
            ))
        })?;
        if !(0.0..=100.0).contains(&pct) {
            return Err(SyntaxError::new(format!(
                "The relative buffer level {percent}% is not in the range 0-100%."
            )));
        }
        return Ok(Level::Fraction(pct / 100.0));
    }

    let bytes = parse_size(raw)?;
    if bytes < 0 {
        return Err(SyntaxError::new("The water mark level must not be negative.".to_owned()));
    }
    Ok(Level::Bytes(bytes as usize))
}

#[cfg(windows)]
fn normalize_separators(spec: String) -> String {
    spec.replace('/', "\\")
}

#[cfg(not(windows))]
fn normalize_separators(spec: String) -> String {
    spec
}

/// The usage text printed when fewer than two endpoints are supplied.
pub fn usage(program: &str) -> String {
    format!(
        "ringpump {version}\n\
         \n\
         usage: {program} <input> <output> [options]\n\
         \n\
         <input>:  Input stream. One of\n\
         \x20         Filename - an ordinary file which is read until EOF,\n\
         \x20         Device - any character device like \"/dev/st0\",\n\
         \x20         Pipe - a named pipe (FIFO) path,\n\
         \x20         Socket - a TCP/IP endpoint tcpip://[hostname]:port or\n\
         \x20         \"-\" - stdin\n\
         <output>: Output stream. One of\n\
         \x20         Filename - an ordinary file which is created or truncated,\n\
         \x20         Device - any character device like \"/dev/st0\",\n\
         \x20         Pipe - a named pipe (FIFO) path,\n\
         \x20         Socket - a TCP/IP endpoint tcpip://[hostname]:port or\n\
         \x20         \"-\" - stdout.\n\
         \n\
         The hostname may be an IP address or a DNS name. If the hostname is\n\
         omitted a local socket is created in listening mode accepting exactly\n\
         one connection.\n\
         \n\
         options:\n\
         \x20-b=<size>  Internal fifo buffer size. 64kiB by default. If the number\n\
         \x20           is followed directly by the letter `k', `m' or `g' the size\n\
         \x20           is multiplied by 1024 to the power of 1, 2 or 3.\n\
         \x20-r=<size>  I/O request size. Derived from the buffer size by default.\n\
         \x20           The request size should not exceed the fifo buffer size;\n\
         \x20           larger values have no effect.\n\
         \x20-p=<size>  Pipe buffer size, only if a named pipe is used.\n\
         \x20-h=<level> High water mark. If the output thread stopped because of an\n\
         \x20           empty buffer it will not resume until the buffer is filled\n\
         \x20           up to the high water mark. The level must be less than or\n\
         \x20           equal to the buffer size. If the level ends with % it is\n\
         \x20           relative to the buffer size in percent. The default of 0\n\
         \x20           resumes the output thread as soon as the buffer is no\n\
         \x20           longer empty.\n\
         \x20-l=<level> Low water mark. If the input thread stopped because the\n\
         \x20           buffer is full it will not resume until the buffer is\n\
         \x20           emptied at least to the low water mark. The level must be\n\
         \x20           less than or equal to the buffer size. If the level ends\n\
         \x20           with % it is relative to the buffer size in percent. The\n\
         \x20           default of 100% resumes the input thread as soon as the\n\
         \x20           buffer is no longer full.\n\
         \x20-c         Enable the OS file cache for file endpoints.\n\
         \x20-si        Print input statistics to stderr.\n\
         \x20-so        Print output statistics to stderr.\n\
         \x20-s         Shorthand for -si -so.\n",
        version = env!("CARGO_PKG_VERSION"),
    )
}
