use std::time::Duration;

use compressor_core::config::ControlConfig;
use compressor_core::control::sensors::round_tenth;
use compressor_core::control::{
    Button, ButtonEdge, ButtonPipeline, ControlMachine, ControlOutputs, ControlRequest,
    ControlStep, Edge, InteractionEvent, SensorTracker, TimeoutStore,
};
use compressor_core::protocol::codec::{decode, encode};
use compressor_core::protocol::{Command, Info, Message, TimerChannel};
use compressor_core::settings::Timeouts;
use compressor_core::time::Monotonic;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "send",
        "send <json>                    - deliver a raw frame as if it came from the socket",
    ),
    (
        "on",
        "on | off | release             - deliver the matching command frame",
    ),
    (
        "timeout",
        "timeout <channel> <minutes>    - change the compression, supply or motor timeout",
    ),
    (
        "sample",
        "sample <psi> <amps>            - feed one pressure/current sample",
    ),
    (
        "press",
        "press shutdown <ms> | press forget - simulate a button press",
    ),
    (
        "advance",
        "advance <seconds>              - move simulated time forward",
    ),
    (
        "status",
        "status                         - display outputs and countdowns",
    ),
    (
        "help",
        "help [topic]                   - show help for a command",
    ),
];

/// Simulated monotonic clock; only moves when the operator advances it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SimInstant(Duration);

impl Monotonic for SimInstant {
    fn after(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration))
    }

    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

#[derive(Debug, Default)]
struct SimOutputs {
    relay: bool,
    solenoid: bool,
}

impl ControlOutputs for SimOutputs {
    fn set_relay(&mut self, energized: bool) {
        self.relay = energized;
    }

    fn set_solenoid(&mut self, open: bool) {
        self.solenoid = open;
    }
}

/// In-memory stand-in for the settings task.
#[derive(Debug, Default)]
struct SimStore {
    timeouts: Timeouts,
    writes: usize,
}

impl TimeoutStore for SimStore {
    fn persist_timeout(&mut self, channel: TimerChannel, minutes: u32) {
        self.timeouts.set(channel, minutes);
        self.writes += 1;
    }
}

pub struct Session {
    machine: ControlMachine<SimOutputs, SimStore, SimInstant>,
    tracker: SensorTracker,
    buttons: ButtonPipeline<SimInstant>,
    now: SimInstant,
    forget_requests: usize,
}

impl Session {
    pub fn new() -> Self {
        let config = ControlConfig::DEFAULT;
        Self {
            machine: ControlMachine::new(
                SimOutputs::default(),
                SimStore::default(),
                Timeouts::DEFAULT,
                config,
            ),
            tracker: SensorTracker::new(),
            buttons: ButtonPipeline::new(config.long_press),
            now: SimInstant::default(),
            forget_requests: 0,
        }
    }

    pub fn handle_command(&mut self, line: &str) -> Vec<String> {
        let trimmed = line.trim();
        let mut words = trimmed.split_whitespace();
        let Some(head) = words.next() else {
            return Vec::new();
        };

        let mut lines = Vec::new();
        let result = match head.to_ascii_lowercase().as_str() {
            "help" => {
                lines.extend(help(words.next()));
                Ok(())
            }
            "send" => {
                self.send_frame(trimmed[head.len()..].trim(), &mut lines);
                Ok(())
            }
            "on" => self.deliver(Command::On, &mut lines),
            "off" => self.deliver(Command::Off, &mut lines),
            "release" => self.deliver(Command::OffRelease, &mut lines),
            "timeout" => self.handle_timeout(words.next(), words.next(), &mut lines),
            "sample" => self.handle_sample(words.next(), words.next(), &mut lines),
            "press" => self.handle_press(words.next(), words.next(), &mut lines),
            "advance" => self.handle_advance(words.next(), &mut lines),
            "status" => {
                lines.extend(self.status());
                Ok(())
            }
            other => Err(format!("Unknown command `{other}`. Type `help` for a list.")),
        };

        if let Err(message) = result {
            lines.push(message);
        }
        lines
    }

    fn send_frame(&mut self, frame: &str, lines: &mut Vec<String>) {
        match decode(frame.as_bytes()) {
            Ok(Message::Command(command)) => self.apply_command(command, lines),
            Ok(Message::Info(info)) => lines.push(format!("ignored info from peer: {info:?}")),
            Err(error) => lines.push(format!("frame rejected: {error}")),
        }
    }

    /// Encodes `command` as the peer would, then runs it through the decoder.
    fn deliver(&mut self, command: Command, lines: &mut Vec<String>) -> Result<(), String> {
        let frame = encode(&Message::Command(command)).map_err(|error| error.to_string())?;
        let text = String::from_utf8_lossy(&frame).into_owned();
        lines.push(format!("{} <- {text}", self.stamp()));
        self.send_frame(&text, lines);
        Ok(())
    }

    fn apply_command(&mut self, command: Command, lines: &mut Vec<String>) {
        let step = self.machine.handle_command(command, self.now);
        self.finish_step(step, lines);
    }

    fn apply_request(&mut self, request: ControlRequest, lines: &mut Vec<String>) {
        let step = self.machine.handle_request(request, self.now);
        self.finish_step(step, lines);
    }

    fn finish_step(&mut self, step: ControlStep, lines: &mut Vec<String>) {
        self.drain_infos(lines);
        if let ControlStep::Dwell(dwell) = step {
            lines.push(format!("{} release dwell {}s", self.stamp(), dwell.as_secs()));
            self.now = self.now.after(dwell);
            self.machine.finish_release();
            self.drain_infos(lines);
        }
    }

    fn drain_infos(&mut self, lines: &mut Vec<String>) {
        while let Some(info) = self.machine.next_info() {
            lines.push(self.render_info(info));
        }
    }

    fn render_info(&self, info: Info) -> String {
        match encode(&Message::Info(info)) {
            Ok(frame) => format!("{} -> {}", self.stamp(), String::from_utf8_lossy(&frame)),
            Err(error) => format!("{} -> {info:?} ({error})", self.stamp()),
        }
    }

    fn handle_timeout(
        &mut self,
        channel: Option<&str>,
        minutes: Option<&str>,
        lines: &mut Vec<String>,
    ) -> Result<(), String> {
        let channel = channel
            .and_then(parse_channel)
            .ok_or_else(|| "Expected channel: compression, supply or motor".to_string())?;
        let minutes = minutes
            .and_then(|value| value.parse::<u32>().ok())
            .ok_or_else(|| "Expected timeout in whole minutes".to_string())?;
        self.deliver(Command::set_timeout(channel, minutes), lines)
    }

    fn handle_sample(
        &mut self,
        pressure: Option<&str>,
        current: Option<&str>,
        lines: &mut Vec<String>,
    ) -> Result<(), String> {
        let (Some(pressure), Some(current)) = (
            pressure.and_then(|value| value.parse::<f32>().ok()),
            current.and_then(|value| value.parse::<f32>().ok()),
        ) else {
            return Err("Expected `sample <psi> <amps>`".to_string());
        };

        let report = self
            .tracker
            .update(round_tenth(pressure), round_tenth(current));
        if let Some(psi) = report.pressure_changed {
            lines.push(self.render_info(Info::PressureChanged(psi)));
        }
        for trigger in report.triggers {
            lines.push(format!("{} sensor {trigger:?}", self.stamp()));
            self.apply_request(ControlRequest::Sensor(trigger), lines);
        }
        Ok(())
    }

    fn handle_press(
        &mut self,
        button: Option<&str>,
        held: Option<&str>,
        lines: &mut Vec<String>,
    ) -> Result<(), String> {
        let button = match button.map(str::to_ascii_lowercase).as_deref() {
            Some("shutdown") => Button::Shutdown,
            Some("forget") => Button::ForgetWifi,
            _ => return Err("Expected `press shutdown <ms>` or `press forget`".to_string()),
        };
        let held = match held {
            Some(value) => value
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "Expected hold time in milliseconds".to_string())?,
            None => Duration::from_millis(100),
        };

        self.feed_edge(button, Edge::Falling, lines);
        let released = self.now.after(held);
        self.advance_to(released, lines);
        self.feed_edge(button, Edge::Rising, lines);
        Ok(())
    }

    fn feed_edge(&mut self, button: Button, edge: Edge, lines: &mut Vec<String>) {
        let event = self.buttons.on_edge(ButtonEdge {
            button,
            edge,
            at: self.now,
        });
        match event {
            Some(InteractionEvent::Shutdown) => {
                lines.push(format!("{} button shutdown", self.stamp()));
                self.apply_request(ControlRequest::Shutdown, lines);
            }
            Some(InteractionEvent::ForgetWifi) => {
                self.forget_requests += 1;
                lines.push(format!(
                    "{} button forget-wifi: credentials cleared, network forgotten",
                    self.stamp()
                ));
            }
            None => {}
        }
    }

    fn handle_advance(&mut self, seconds: Option<&str>, lines: &mut Vec<String>) -> Result<(), String> {
        let seconds = seconds
            .and_then(|value| value.parse::<u64>().ok())
            .ok_or_else(|| "Expected whole seconds".to_string())?;
        let target = self.now.after(Duration::from_secs(seconds));
        self.advance_to(target, lines);
        Ok(())
    }

    /// Fires every deadline up to `target` in order, then parks the clock there.
    fn advance_to(&mut self, target: SimInstant, lines: &mut Vec<String>) {
        loop {
            let next = [self.machine.next_deadline(), self.buttons.next_deadline()]
                .into_iter()
                .flatten()
                .min();
            let Some(deadline) = next.filter(|deadline| *deadline <= target) else {
                break;
            };
            self.now = self.now.max(deadline);
            self.buttons.poll(self.now);
            let step = self.machine.poll(self.now);
            self.finish_step(step, lines);
        }
        self.now = self.now.max(target);
    }

    fn status(&self) -> Vec<String> {
        let outputs = self.machine.outputs();
        let mut lines = vec![format!(
            "{} relay={} solenoid={} releasing={}",
            self.stamp(),
            on_off(outputs.relay),
            if outputs.solenoid { "open" } else { "closed" },
            self.machine.is_releasing(),
        )];
        for channel in TimerChannel::ALL {
            let countdown = self.machine.countdown(channel);
            let state = if countdown.is_running() {
                format!(
                    "running, {} of {} min remaining",
                    countdown.remaining_minutes(),
                    countdown.timeout_minutes()
                )
            } else {
                format!("stopped, timeout {} min", countdown.timeout_minutes())
            };
            lines.push(format!("  {:<12}{state}", channel.label()));
        }
        let store = self.machine.store();
        lines.push(format!(
            "  saved timeouts: compression={} supply={} motor={} ({} writes)",
            store.timeouts.compression, store.timeouts.supply, store.timeouts.motor, store.writes
        ));
        if self.forget_requests > 0 {
            lines.push(format!("  forget-wifi presses: {}", self.forget_requests));
        }
        lines
    }

    fn stamp(&self) -> String {
        format!("[{:>7.1}s]", self.now.0.as_secs_f32())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_channel(name: &str) -> Option<TimerChannel> {
    TimerChannel::ALL
        .into_iter()
        .find(|channel| channel.label().eq_ignore_ascii_case(name))
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

fn help(topic: Option<&str>) -> Vec<String> {
    match topic {
        None => HELP_TOPICS.iter().map(|(_, text)| (*text).to_string()).collect(),
        Some(topic) => match HELP_TOPICS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(topic))
        {
            Some((_, text)) => vec![(*text).to_string()],
            None => vec![format!("No help for `{topic}`")],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contains(lines: &[String], needle: &str) -> bool {
        lines.iter().any(|line| line.contains(needle))
    }

    #[test]
    fn on_energizes_relay_and_reports() {
        let mut session = Session::new();
        let lines = session.handle_command("on");
        assert!(contains(&lines, r#""infoType":"TURNED_ON""#));
        assert!(session.machine.outputs().relay);
        assert!(session.machine.countdown(TimerChannel::Compression).is_running());
    }

    #[test]
    fn release_dwells_then_closes_solenoid() {
        let mut session = Session::new();
        session.handle_command("on");
        let lines = session.handle_command("release");
        assert!(contains(&lines, "release dwell 20s"));
        assert!(contains(&lines, "RELEASED"));
        assert!(!session.machine.outputs().relay);
        assert!(!session.machine.outputs().solenoid);
        assert_eq!(session.now, SimInstant(Duration::from_secs(20)));
    }

    #[test]
    fn timeout_command_is_persisted() {
        let mut session = Session::new();
        session.handle_command("timeout supply 9");
        assert_eq!(session.machine.store().timeouts.supply, 9);
        assert_eq!(session.machine.store().writes, 1);
    }

    #[test]
    fn short_shutdown_press_releases() {
        let mut session = Session::new();
        session.handle_command("on");
        let lines = session.handle_command("press shutdown 300");
        assert!(contains(&lines, "button shutdown"));
        assert!(!session.machine.outputs().relay);
    }

    #[test]
    fn long_shutdown_press_is_ignored() {
        let mut session = Session::new();
        session.handle_command("on");
        let lines = session.handle_command("press shutdown 700");
        assert!(!contains(&lines, "button shutdown"));
        assert!(session.machine.outputs().relay);
    }

    #[test]
    fn malformed_frame_is_reported() {
        let mut session = Session::new();
        let lines = session.handle_command("send {\"messageType\":");
        assert!(contains(&lines, "frame rejected"));
    }

    #[test]
    fn unknown_command_points_at_help() {
        let mut session = Session::new();
        let lines = session.handle_command("launch");
        assert_eq!(lines, vec!["Unknown command `launch`. Type `help` for a list.".to_string()]);
    }
}
