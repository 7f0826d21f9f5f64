//! Grammar for the maintenance console.
//!
//! The console is the interactive surface shared by the firmware serial
//! shell and the host emulator: one line in, one structured command out.
//! Keywords are dispatched by hand so unknown commands report the offending
//! word; argument literals (integers, suffixed durations) are parsed with
//! `winnow` combinators. Everything borrows from the input line, so the
//! grammar stays allocation-free.

use core::fmt;
use core::time::Duration;

use winnow::ascii::{dec_uint, Caseless};
use winnow::combinator::{alt, terminated};
use winnow::prelude::*;
use winnow::token::literal;

use crate::sensing::Bus;

/// One usage line per command, shared by `help` renderers.
pub const USAGE: &[&str] = &[
    "status                  show session, battery, and topology",
    "log                     toggle recording on or off",
    "interval <1-59>         set the acquisition period in minutes",
    "battery <mv>            feed a raw supply sample (simulation)",
    "wake timer|button|usb|rtc  simulate the next wake cause",
    "hold <Nms|Ns>           simulate a button hold of that length",
    "sensors attach <1-3>    attach a sensor on the given port",
    "sensors detach <1-3>    detach one sensor from the given port",
    "sensors hang            make the next sensor sweep stall",
    "help [command]          show usage",
];

/// Structured console commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsoleCommand<'a> {
    /// Print the session, battery, and topology summary.
    Status,
    /// Toggle recording, as a long button hold would.
    Log,
    /// Change the acquisition interval.
    Interval { minutes: u8 },
    /// Inject a raw battery sample.
    Battery { millivolts: u16 },
    /// Select the wake cause for the next simulated boot.
    Wake(WakeSignal),
    /// Simulate a button press held for the given time.
    Hold { held: Duration },
    /// Manipulate the simulated sensor harness.
    Sensors(SensorsCommand),
    /// Show usage, optionally narrowed to one command.
    Help { topic: Option<&'a str> },
}

/// Wake causes the console can inject.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WakeSignal {
    Timer,
    Button,
    Usb,
    Rtc,
}

impl WakeSignal {
    /// Hardware wake-status bit this signal asserts.
    #[must_use]
    pub const fn status_bit(self) -> u8 {
        match self {
            WakeSignal::Timer => crate::boot::WAKE_BIT_TIMER,
            WakeSignal::Button => crate::boot::WAKE_BIT_BUTTON,
            WakeSignal::Usb => crate::boot::WAKE_BIT_USB,
            WakeSignal::Rtc => crate::boot::WAKE_BIT_RTC,
        }
    }
}

/// Sensor-harness manipulation subcommands.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SensorsCommand {
    Attach { bus: Bus },
    Detach { bus: Bus },
    Hang,
}

/// Why a line failed to parse.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError<'a> {
    /// The line was blank.
    Empty,
    /// The first word is not a known command.
    UnknownCommand { word: &'a str },
    /// A required argument was absent.
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },
    /// An argument was present but malformed or out of range.
    InvalidArgument {
        expected: &'static str,
        found: &'a str,
    },
    /// Input remained after a complete command.
    TrailingInput { found: &'a str },
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => f.write_str("empty command line"),
            ParseError::UnknownCommand { word } => {
                write!(f, "unknown command `{word}`, try `help`")
            }
            ParseError::MissingArgument { command, expected } => {
                write!(f, "`{command}` needs {expected}")
            }
            ParseError::InvalidArgument { expected, found } => {
                write!(f, "expected {expected}, found `{found}`")
            }
            ParseError::TrailingInput { found } => {
                write!(f, "unexpected trailing input `{found}`")
            }
        }
    }
}

/// Parses one console line into a command.
pub fn parse(line: &str) -> Result<ConsoleCommand<'_>, ParseError<'_>> {
    let mut rest = line.trim();
    let Some(keyword) = next_word(&mut rest) else {
        return Err(ParseError::Empty);
    };

    let command = if keyword.eq_ignore_ascii_case("status") {
        ConsoleCommand::Status
    } else if keyword.eq_ignore_ascii_case("log") {
        ConsoleCommand::Log
    } else if keyword.eq_ignore_ascii_case("interval") {
        let minutes = integer_arg(&mut rest, "interval", "a minute count (1-59)")?;
        ConsoleCommand::Interval { minutes }
    } else if keyword.eq_ignore_ascii_case("battery") {
        let millivolts = integer_arg(&mut rest, "battery", "a millivolt reading")?;
        ConsoleCommand::Battery { millivolts }
    } else if keyword.eq_ignore_ascii_case("wake") {
        ConsoleCommand::Wake(wake_arg(&mut rest)?)
    } else if keyword.eq_ignore_ascii_case("hold") {
        let held = duration_arg(&mut rest)?;
        ConsoleCommand::Hold { held }
    } else if keyword.eq_ignore_ascii_case("sensors") {
        ConsoleCommand::Sensors(sensors_arg(&mut rest)?)
    } else if keyword.eq_ignore_ascii_case("help") {
        let topic = next_word(&mut rest);
        ConsoleCommand::Help { topic }
    } else {
        return Err(ParseError::UnknownCommand { word: keyword });
    };

    match next_word(&mut rest) {
        None => Ok(command),
        Some(found) => Err(ParseError::TrailingInput { found }),
    }
}

/// Splits the next whitespace-delimited word off the front of `rest`.
fn next_word<'a>(rest: &mut &'a str) -> Option<&'a str> {
    let trimmed = rest.trim_start();
    if trimmed.is_empty() {
        *rest = trimmed;
        return None;
    }
    let end = trimmed
        .find(|c: char| c.is_ascii_whitespace())
        .unwrap_or(trimmed.len());
    let (word, tail) = trimmed.split_at(end);
    *rest = tail;
    Some(word)
}

fn integer_arg<'a, N>(
    rest: &mut &'a str,
    command: &'static str,
    expected: &'static str,
) -> Result<N, ParseError<'a>>
where
    N: winnow::ascii::Uint,
{
    let Some(word) = next_word(rest) else {
        return Err(ParseError::MissingArgument { command, expected });
    };
    dec_uint::<_, N, winnow::error::ContextError>
        .parse(word)
        .map_err(|_| ParseError::InvalidArgument {
            expected,
            found: word,
        })
}

fn wake_arg<'a>(rest: &mut &'a str) -> Result<WakeSignal, ParseError<'a>> {
    let Some(word) = next_word(rest) else {
        return Err(ParseError::MissingArgument {
            command: "wake",
            expected: "one of timer, button, usb, rtc",
        });
    };
    if word.eq_ignore_ascii_case("timer") {
        Ok(WakeSignal::Timer)
    } else if word.eq_ignore_ascii_case("button") {
        Ok(WakeSignal::Button)
    } else if word.eq_ignore_ascii_case("usb") {
        Ok(WakeSignal::Usb)
    } else if word.eq_ignore_ascii_case("rtc") {
        Ok(WakeSignal::Rtc)
    } else {
        Err(ParseError::InvalidArgument {
            expected: "one of timer, button, usb, rtc",
            found: word,
        })
    }
}

/// Winnow parser for a duration literal with an `ms` or `s` suffix.
fn duration_literal(input: &mut &str) -> ModalResult<Duration> {
    alt((
        terminated(dec_uint, literal(Caseless("ms"))).map(Duration::from_millis),
        terminated(dec_uint, literal(Caseless("s"))).map(Duration::from_secs),
    ))
    .parse_next(input)
}

fn duration_arg<'a>(rest: &mut &'a str) -> Result<Duration, ParseError<'a>> {
    let Some(word) = next_word(rest) else {
        return Err(ParseError::MissingArgument {
            command: "hold",
            expected: "a duration such as 3500ms or 4s",
        });
    };
    duration_literal
        .parse(word)
        .map_err(|_| ParseError::InvalidArgument {
            expected: "a duration such as 3500ms or 4s",
            found: word,
        })
}

fn sensors_arg<'a>(rest: &mut &'a str) -> Result<SensorsCommand, ParseError<'a>> {
    let Some(word) = next_word(rest) else {
        return Err(ParseError::MissingArgument {
            command: "sensors",
            expected: "one of attach, detach, hang",
        });
    };
    if word.eq_ignore_ascii_case("attach") {
        Ok(SensorsCommand::Attach {
            bus: bus_arg(rest, "sensors attach")?,
        })
    } else if word.eq_ignore_ascii_case("detach") {
        Ok(SensorsCommand::Detach {
            bus: bus_arg(rest, "sensors detach")?,
        })
    } else if word.eq_ignore_ascii_case("hang") {
        Ok(SensorsCommand::Hang)
    } else {
        Err(ParseError::InvalidArgument {
            expected: "one of attach, detach, hang",
            found: word,
        })
    }
}

fn bus_arg<'a>(rest: &mut &'a str, command: &'static str) -> Result<Bus, ParseError<'a>> {
    let expected = "a port number (1-3)";
    let Some(word) = next_word(rest) else {
        return Err(ParseError::MissingArgument { command, expected });
    };
    let port: usize = dec_uint::<_, usize, winnow::error::ContextError>
        .parse(word)
        .map_err(|_| ParseError::InvalidArgument {
            expected,
            found: word,
        })?;
    port.checked_sub(1)
        .and_then(Bus::from_index)
        .ok_or(ParseError::InvalidArgument {
            expected,
            found: word,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_keywords_parse() {
        assert_eq!(parse("status"), Ok(ConsoleCommand::Status));
        assert_eq!(parse("  log  "), Ok(ConsoleCommand::Log));
        assert_eq!(parse("help"), Ok(ConsoleCommand::Help { topic: None }));
        assert_eq!(
            parse("HELP wake"),
            Ok(ConsoleCommand::Help {
                topic: Some("wake")
            })
        );
    }

    #[test]
    fn integer_arguments_parse_and_reject_overflow() {
        assert_eq!(parse("interval 5"), Ok(ConsoleCommand::Interval { minutes: 5 }));
        assert_eq!(
            parse("battery 3712"),
            Ok(ConsoleCommand::Battery { millivolts: 3712 })
        );
        assert!(matches!(
            parse("interval 300"),
            Err(ParseError::InvalidArgument { found: "300", .. })
        ));
        assert!(matches!(
            parse("battery"),
            Err(ParseError::MissingArgument {
                command: "battery",
                ..
            })
        ));
    }

    #[test]
    fn wake_signals_are_case_insensitive() {
        assert_eq!(parse("wake timer"), Ok(ConsoleCommand::Wake(WakeSignal::Timer)));
        assert_eq!(parse("wake RTC"), Ok(ConsoleCommand::Wake(WakeSignal::Rtc)));
        assert!(matches!(
            parse("wake moon"),
            Err(ParseError::InvalidArgument { found: "moon", .. })
        ));
    }

    #[test]
    fn hold_durations_accept_both_suffixes() {
        assert_eq!(
            parse("hold 3500ms"),
            Ok(ConsoleCommand::Hold {
                held: Duration::from_millis(3500)
            })
        );
        assert_eq!(
            parse("hold 4s"),
            Ok(ConsoleCommand::Hold {
                held: Duration::from_secs(4)
            })
        );
        assert!(matches!(
            parse("hold 4"),
            Err(ParseError::InvalidArgument { found: "4", .. })
        ));
    }

    #[test]
    fn sensors_subcommands_map_port_numbers() {
        assert_eq!(
            parse("sensors attach 2"),
            Ok(ConsoleCommand::Sensors(SensorsCommand::Attach {
                bus: Bus::Port2
            }))
        );
        assert_eq!(
            parse("sensors detach 1"),
            Ok(ConsoleCommand::Sensors(SensorsCommand::Detach {
                bus: Bus::Port1
            }))
        );
        assert_eq!(
            parse("sensors hang"),
            Ok(ConsoleCommand::Sensors(SensorsCommand::Hang))
        );
        assert!(matches!(
            parse("sensors attach 0"),
            Err(ParseError::InvalidArgument { found: "0", .. })
        ));
        assert!(matches!(
            parse("sensors attach 4"),
            Err(ParseError::InvalidArgument { found: "4", .. })
        ));
    }

    #[test]
    fn junk_lines_report_typed_errors() {
        assert_eq!(parse("   "), Err(ParseError::Empty));
        assert!(matches!(
            parse("reboot now"),
            Err(ParseError::UnknownCommand { word: "reboot" })
        ));
        assert!(matches!(
            parse("status please"),
            Err(ParseError::TrailingInput { found: "please" })
        ));
    }

    #[test]
    fn wake_signal_bits_match_dispatcher_inputs() {
        assert_eq!(
            WakeSignal::Timer.status_bit(),
            crate::boot::WAKE_BIT_TIMER
        );
        assert_eq!(WakeSignal::Rtc.status_bit(), crate::boot::WAKE_BIT_RTC);
    }
}
