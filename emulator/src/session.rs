use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant as HostInstant};

use logger_core::acquire::{TaskId, TaskReport};
use logger_core::boot::{classify_press, BootPath, Press};
use logger_core::console::{self, ConsoleCommand, SensorsCommand};
use logger_core::power::{battery_percentage, WakeSources, SAFE_SLEEP_THRESHOLD_MV};
use logger_core::sensing::{Bus, ALL_BUSES};
use logger_core::session::SessionError;
use logger_core::time::TimeKeeper;

use crate::device::{CycleReport, SimDevice};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptProfile {
    Bench,
    Field,
}

impl TranscriptProfile {
    pub fn log_path(self) -> &'static str {
        match self {
            TranscriptProfile::Bench => "transcripts/emulator-bench.log",
            TranscriptProfile::Field => "transcripts/emulator-field.log",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            TranscriptProfile::Bench => "Enviro Logger Emulator bench transcript",
            TranscriptProfile::Field => "Enviro Logger Emulator field transcript",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        if tag.eq_ignore_ascii_case("bench") {
            Ok(Self::Bench)
        } else if tag.eq_ignore_ascii_case("field") {
            Ok(Self::Field)
        } else {
            Err(format!("Unknown transcript profile `{tag}`"))
        }
    }

    /// Resolves a profile from the command-line arguments. Accepts the bare
    /// tag, `--profile <tag>`, or `--profile=<tag>`; no arguments selects
    /// the bench profile.
    pub fn from_args<I>(mut args: I) -> Result<Self, String>
    where
        I: Iterator<Item = String>,
    {
        let Some(arg) = args.next() else {
            return Ok(Self::Bench);
        };
        if let Some(value) = arg.strip_prefix("--profile=") {
            Self::from_tag(value)
        } else if arg == "--profile" {
            match args.next() {
                Some(value) => Self::from_tag(&value),
                None => Err("Expected value after --profile".to_string()),
            }
        } else {
            Self::from_tag(&arg)
        }
    }
}

pub struct Session {
    device: SimDevice,
    transcript: TranscriptLogger,
    started_at: HostInstant,
    cycle_count: usize,
}

impl Session {
    pub fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let transcript = TranscriptLogger::new(profile)?;
        Ok(Self {
            device: SimDevice::new(),
            transcript,
            started_at: HostInstant::now(),
            cycle_count: 0,
        })
    }

    /// Drives the line-oriented console until end of input or a quit word.
    pub fn run<R, W>(&mut self, mut input: R, mut output: W) -> io::Result<()>
    where
        R: BufRead,
        W: Write,
    {
        writeln!(
            output,
            "Enviro Logger Emulator ready. Type `help` for commands or `exit` to quit."
        )?;

        let mut line = String::new();
        loop {
            line.clear();
            write!(output, "> ")?;
            output.flush()?;

            if input.read_line(&mut line)? == 0 {
                writeln!(output)?;
                return Ok(());
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if is_quit(trimmed) {
                writeln!(output, "Session closed.")?;
                return Ok(());
            }

            for response in self.handle_command(trimmed)? {
                writeln!(output, "{response}")?;
            }
        }
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.started_at.elapsed();
        self.transcript
            .append_line(elapsed, TranscriptRole::Host, trimmed)?;

        let lines = match console::parse(trimmed) {
            Ok(command) => self.dispatch(&command),
            Err(err) => vec![format!("ERR syntax {err}")],
        };

        self.record_output(elapsed, &lines)?;
        Ok(lines)
    }

    fn dispatch(&mut self, command: &ConsoleCommand<'_>) -> Vec<String> {
        match command {
            ConsoleCommand::Status => self.handle_status(),
            ConsoleCommand::Log => self.toggle_recording(),
            ConsoleCommand::Interval { minutes } => self.handle_interval(*minutes),
            ConsoleCommand::Battery { millivolts } => self.handle_battery(*millivolts),
            ConsoleCommand::Wake(signal) => {
                self.cycle_count += 1;
                let report = self.device.run_cycle(signal.status_bit());
                describe_cycle(self.cycle_count, &report)
            }
            ConsoleCommand::Hold { held } => match classify_press(*held) {
                Press::Long => self.toggle_recording(),
                Press::Short => vec![format!(
                    "OK short press ({}ms), display woken only",
                    held.as_millis()
                )],
            },
            ConsoleCommand::Sensors(subcommand) => self.handle_sensors(*subcommand),
            ConsoleCommand::Help { topic } => help_lines(*topic),
        }
    }

    fn handle_status(&self) -> Vec<String> {
        let snapshot = self.device.session.snapshot();
        let mode = match snapshot.active_log.filter(|_| snapshot.recording) {
            Some(log) => format!("recording log={}", log.path().as_str()),
            None => "idle".to_string(),
        };

        let smoothed = snapshot.smoothed_battery_mv;
        let safe = if smoothed > SAFE_SLEEP_THRESHOLD_MV || smoothed == 0 {
            "yes"
        } else {
            "no"
        };

        let harness = self.device.sensors.lock().expect("sensor bus lock");
        let mut ports = String::new();
        for bus in ALL_BUSES {
            if !ports.is_empty() {
                ports.push(' ');
            }
            ports.push_str(&format!(
                "port{}={}",
                port_number(bus),
                harness.port_count(bus)
            ));
        }
        let total = harness.total();
        drop(harness);

        vec![
            format!(
                "session: {mode} interval={}m boots={}",
                snapshot.interval_minutes, snapshot.boot_count
            ),
            format!(
                "battery: smoothed={smoothed}mV ({}%) supply={}mV safe-to-sleep={safe}",
                battery_percentage(smoothed),
                self.device.supply_mv
            ),
            format!("sensors: {ports} total={total}"),
        ]
    }

    fn toggle_recording(&mut self) -> Vec<String> {
        let now = self.device.clock.now();
        if self.device.session.recording {
            let closed = self.device.session.active_log;
            self.device.session.stop_recording();
            match closed {
                Some(log) => vec![format!("OK recording stopped, closed {}", log.path().as_str())],
                None => vec!["OK recording stopped".to_string()],
            }
        } else {
            let log = self.device.session.start_recording(&now);
            vec![format!(
                "OK recording started log={} interval={}m",
                log.path().as_str(),
                self.device.session.interval_minutes
            )]
        }
    }

    fn handle_interval(&mut self, minutes: u8) -> Vec<String> {
        match self.device.session.set_interval(minutes) {
            Ok(()) => vec![format!("OK interval set to {minutes}m")],
            Err(SessionError::RecordingActive) => {
                vec!["ERR interval is locked while recording".to_string()]
            }
            Err(SessionError::IntervalOutOfRange { minutes }) => {
                vec![format!("ERR interval {minutes} out of range (1-59)")]
            }
        }
    }

    fn handle_battery(&mut self, millivolts: u16) -> Vec<String> {
        self.device.supply_mv = millivolts;
        vec![format!(
            "OK supply {millivolts}mV ({}%), sampled on the next cycle",
            battery_percentage(millivolts)
        )]
    }

    fn handle_sensors(&mut self, subcommand: SensorsCommand) -> Vec<String> {
        let mut harness = self.device.sensors.lock().expect("sensor bus lock");
        match subcommand {
            SensorsCommand::Attach { bus } => match harness.attach(bus) {
                Some(count) => vec![format!(
                    "OK sensor attached, port {} now has {count}",
                    port_number(bus)
                )],
                None => vec![format!("ERR port {} is full", port_number(bus))],
            },
            SensorsCommand::Detach { bus } => match harness.detach(bus) {
                Some(count) => vec![format!(
                    "OK sensor detached, port {} now has {count}",
                    port_number(bus)
                )],
                None => vec![format!("ERR port {} is already empty", port_number(bus))],
            },
            SensorsCommand::Hang => {
                harness.hang_next_sweep();
                vec!["OK next sweep will stall past the barrier ceiling".to_string()]
            }
        }
    }

    fn record_output(&mut self, elapsed: Duration, lines: &[String]) -> io::Result<()> {
        for line in lines {
            self.transcript
                .append_line(elapsed, TranscriptRole::Emulator, line)?;
        }
        Ok(())
    }
}

fn is_quit(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn describe_cycle(cycle: usize, report: &CycleReport) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(format!(
        "OK wake cycle={cycle} cause={} path={}",
        report.cause.label(),
        path_label(report.path)
    ));
    lines.push(format!(
        "  tasks battery={} clock={} sensors={} readings={}",
        report_label(report.outcome.reports[TaskId::Battery as usize]),
        report_label(report.outcome.reports[TaskId::ClockSync as usize]),
        report_label(report.outcome.reports[TaskId::Sensors as usize]),
        report.readings.len()
    ));
    if let Some(row) = &report.appended_row {
        lines.push(format!("  appended {row}"));
    }
    if report.outcome.storage_failed {
        lines.push("  WARN storage refused the row, retried next cycle".to_string());
    }
    let alarm = match report.outcome.alarm {
        Some(plan) => format!(":{:02}", plan.minute_of_hour),
        None => "none".to_string(),
    };
    lines.push(format!(
        "OK sleeping armed={} alarm={alarm}",
        describe_armed(report.outcome.armed)
    ));
    lines
}

fn help_lines(topic: Option<&str>) -> Vec<String> {
    let mut lines = Vec::new();
    match topic {
        Some(target) if !target.is_empty() => {
            let matches: Vec<&str> = console::USAGE
                .iter()
                .copied()
                .filter(|usage| {
                    usage
                        .split_whitespace()
                        .next()
                        .is_some_and(|word| word.eq_ignore_ascii_case(target))
                })
                .collect();
            if matches.is_empty() {
                lines.push(format!("No help available for `{target}`."));
                lines.push("Type `help` for the full command list.".to_string());
            } else {
                for usage in matches {
                    lines.push(usage.to_string());
                }
            }
        }
        _ => {
            lines.push("Available commands:".to_string());
            for usage in console::USAGE {
                lines.push(format!("  {usage}"));
            }
            lines.push("Type `help <command>` for a single entry.".to_string());
        }
    }
    lines
}

fn path_label(path: BootPath) -> &'static str {
    match path {
        BootPath::SilentAcquisition => "silent-acquisition",
        BootPath::Interactive => "interactive",
    }
}

fn report_label(report: TaskReport) -> &'static str {
    match report {
        TaskReport::Done => "done",
        TaskReport::Faulted => "fault",
        TaskReport::TimedOut => "timeout",
    }
}

fn describe_armed(sources: WakeSources) -> String {
    let mut out = String::new();
    for (mask, name) in [
        (WakeSources::BUTTON, "button"),
        (WakeSources::USB, "usb"),
        (WakeSources::RTC_ALARM, "rtc"),
    ] {
        if sources.contains(mask) {
            if !out.is_empty() {
                out.push('+');
            }
            out.push_str(name);
        }
    }
    if out.is_empty() {
        out.push_str("none");
    }
    out
}

fn port_number(bus: Bus) -> usize {
    bus.as_index() + 1
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let path = Path::new(profile.log_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(profile)?;
        Ok(logger)
    }

    fn write_header(&mut self, profile: TranscriptProfile) -> io::Result<()> {
        writeln!(self.writer, "# {}", profile.header())?;
        writeln!(
            self.writer,
            "# Timestamps are milliseconds since session start"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn args(list: &[&str]) -> std::vec::IntoIter<String> {
        list.iter()
            .map(|arg| (*arg).to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn profile_arguments_accept_every_spelling() {
        assert_eq!(
            TranscriptProfile::from_args(args(&[])),
            Ok(TranscriptProfile::Bench)
        );
        assert_eq!(
            TranscriptProfile::from_args(args(&["field"])),
            Ok(TranscriptProfile::Field)
        );
        assert_eq!(
            TranscriptProfile::from_args(args(&["--profile", "bench"])),
            Ok(TranscriptProfile::Bench)
        );
        assert_eq!(
            TranscriptProfile::from_args(args(&["--profile=field"])),
            Ok(TranscriptProfile::Field)
        );
        assert!(TranscriptProfile::from_args(args(&["--profile"])).is_err());
        assert!(TranscriptProfile::from_args(args(&["lab"])).is_err());
    }

    #[test]
    fn console_run_answers_and_closes_on_quit() {
        let mut session = Session::new(TranscriptProfile::Field).expect("transcript opens");
        let input = Cursor::new("status\nquit\nnever reached\n");
        let mut output = Vec::new();

        session.run(input, &mut output).expect("console run");

        let text = String::from_utf8(output).expect("console output is utf-8");
        assert!(text.starts_with("Enviro Logger Emulator ready."));
        assert!(text.contains("session: idle"));
        assert!(text.ends_with("Session closed.\n"));
        assert!(!text.contains("never reached"));
    }
}
