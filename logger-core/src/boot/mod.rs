//! Wake-cause classification and boot-path dispatch.
//!
//! The dispatcher runs first on every boot: it classifies the
//! hardware-reported wake status and, together with the retained session
//! record, selects one of the two boot paths. Dispatch is a pure function of
//! `(cause, retained state)`; retained state is the only thing surviving a
//! power cycle, so the same pair must always yield the same path.

use core::time::Duration;

use crate::session::SessionSnapshot;

/// Wake status bit reported for the RTC wakeup timer.
pub const WAKE_BIT_TIMER: u8 = 1 << 0;
/// Wake status bit reported for the user button line.
pub const WAKE_BIT_BUTTON: u8 = 1 << 1;
/// Wake status bit reported for USB supply presence.
pub const WAKE_BIT_USB: u8 = 1 << 2;
/// Wake status bit reported for the RTC alarm interrupt line.
pub const WAKE_BIT_RTC: u8 = 1 << 3;

/// Bounded window an interactive boot stays awake without USB presence.
pub const INTERACTIVE_WINDOW: Duration = Duration::from_secs(120);

/// Hold duration that toggles recording; shorter presses are ignored.
pub const LONG_HOLD: Duration = Duration::from_millis(3000);

/// Why the device resumed from deep sleep.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WakeCause {
    Timer,
    UserButton,
    UsbPresence,
    RtcInterrupt,
    ColdBoot,
}

impl WakeCause {
    /// Classifies the hardware wake status, once per boot.
    ///
    /// When several sources assert simultaneously (button held during USB
    /// insertion, for example) the lowest-numbered asserted bit wins. That
    /// tie-break is a documented policy, not a hardware guarantee.
    #[must_use]
    pub const fn from_status_bits(bits: u8) -> Self {
        if bits & WAKE_BIT_TIMER != 0 {
            Self::Timer
        } else if bits & WAKE_BIT_BUTTON != 0 {
            Self::UserButton
        } else if bits & WAKE_BIT_USB != 0 {
            Self::UsbPresence
        } else if bits & WAKE_BIT_RTC != 0 {
            Self::RtcInterrupt
        } else {
            Self::ColdBoot
        }
    }

    /// Short label for boot logging.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Timer => "timer",
            Self::UserButton => "button",
            Self::UsbPresence => "usb",
            Self::RtcInterrupt => "rtc",
            Self::ColdBoot => "cold-boot",
        }
    }
}

/// The two defined boot paths.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BootPath {
    /// Timer wake while recording: no UI, acquire, append one row, re-arm
    /// the alarm, sleep. Runs unattended for the whole field deployment.
    SilentAcquisition,
    /// Any user-facing wake: UI and acquisition run concurrently, the
    /// device stays awake for a bounded window or while USB is present.
    Interactive,
}

/// Selects the boot path. Pure: depends only on the arguments.
#[must_use]
pub const fn dispatch(cause: WakeCause, state: &SessionSnapshot) -> BootPath {
    match cause {
        WakeCause::Timer if state.recording => BootPath::SilentAcquisition,
        _ => BootPath::Interactive,
    }
}

/// Execution plan derived from the dispatched path.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BootPlan {
    pub path: BootPath,
    /// Display and input stack come up only on the interactive path.
    pub display_on: bool,
    /// Stay-awake bound; `None` means sleep as soon as acquisition ends.
    pub interactive_window: Option<Duration>,
}

/// Expands the dispatched path into a boot plan.
#[must_use]
pub const fn plan(cause: WakeCause, state: &SessionSnapshot) -> BootPlan {
    match dispatch(cause, state) {
        BootPath::SilentAcquisition => BootPlan {
            path: BootPath::SilentAcquisition,
            display_on: false,
            interactive_window: None,
        },
        BootPath::Interactive => BootPlan {
            path: BootPath::Interactive,
            display_on: true,
            interactive_window: Some(INTERACTIVE_WINDOW),
        },
    }
}

/// Whether the interactive window has run out.
///
/// USB presence defers expiry: a bench-powered device keeps its console
/// reachable until unplugged, and the window countdown restarts from the
/// moment presence drops.
#[must_use]
pub fn window_expired(since_presence: Duration, usb_present: bool) -> bool {
    !usb_present && since_presence >= INTERACTIVE_WINDOW
}

/// Button press classification produced by the debounce task.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Press {
    /// Below the long-hold threshold; ignored.
    Short,
    /// At or above [`LONG_HOLD`]; toggles recording.
    Long,
}

/// Classifies a debounced hold duration.
#[must_use]
pub fn classify_press(held: Duration) -> Press {
    if held >= LONG_HOLD {
        Press::Long
    } else {
        Press::Short
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;

    fn snapshot(recording: bool) -> SessionSnapshot {
        let mut state = SessionState::cold_boot();
        if recording {
            state.start_recording(&crate::time::CivilTime::new(2024, 6, 3, 10, 0, 0));
        }
        state.snapshot()
    }

    #[test]
    fn zero_status_classifies_as_cold_boot() {
        assert_eq!(WakeCause::from_status_bits(0), WakeCause::ColdBoot);
    }

    #[test]
    fn single_bits_classify_directly() {
        assert_eq!(WakeCause::from_status_bits(WAKE_BIT_TIMER), WakeCause::Timer);
        assert_eq!(
            WakeCause::from_status_bits(WAKE_BIT_BUTTON),
            WakeCause::UserButton
        );
        assert_eq!(
            WakeCause::from_status_bits(WAKE_BIT_USB),
            WakeCause::UsbPresence
        );
        assert_eq!(
            WakeCause::from_status_bits(WAKE_BIT_RTC),
            WakeCause::RtcInterrupt
        );
    }

    #[test]
    fn ambiguous_status_resolves_to_lowest_bit() {
        // Button held during USB insertion.
        assert_eq!(
            WakeCause::from_status_bits(WAKE_BIT_BUTTON | WAKE_BIT_USB),
            WakeCause::UserButton
        );
        // Timer expiry racing a button press.
        assert_eq!(
            WakeCause::from_status_bits(WAKE_BIT_TIMER | WAKE_BIT_BUTTON),
            WakeCause::Timer
        );
    }

    #[test]
    fn timer_while_recording_goes_silent() {
        assert_eq!(
            dispatch(WakeCause::Timer, &snapshot(true)),
            BootPath::SilentAcquisition
        );
    }

    #[test]
    fn timer_while_idle_goes_interactive() {
        assert_eq!(
            dispatch(WakeCause::Timer, &snapshot(false)),
            BootPath::Interactive
        );
    }

    #[test]
    fn button_is_always_interactive() {
        assert_eq!(
            dispatch(WakeCause::UserButton, &snapshot(false)),
            BootPath::Interactive
        );
        assert_eq!(
            dispatch(WakeCause::UserButton, &snapshot(true)),
            BootPath::Interactive
        );
    }

    #[test]
    fn dispatch_is_stable_for_identical_inputs() {
        let state = snapshot(true);
        let first = dispatch(WakeCause::Timer, &state);
        for _ in 0..16 {
            assert_eq!(dispatch(WakeCause::Timer, &state), first);
        }
    }

    #[test]
    fn silent_plan_keeps_display_off() {
        let plan = plan(WakeCause::Timer, &snapshot(true));
        assert_eq!(plan.path, BootPath::SilentAcquisition);
        assert!(!plan.display_on);
        assert!(plan.interactive_window.is_none());
    }

    #[test]
    fn interactive_plan_bounds_the_awake_window() {
        let plan = plan(WakeCause::ColdBoot, &snapshot(false));
        assert!(plan.display_on);
        assert_eq!(plan.interactive_window, Some(INTERACTIVE_WINDOW));
    }

    #[test]
    fn usb_presence_defers_window_expiry() {
        assert!(!window_expired(Duration::from_secs(119), false));
        assert!(window_expired(INTERACTIVE_WINDOW, false));
        assert!(window_expired(Duration::from_secs(3600), false));

        // Plugged in: the window never runs out, however long elapsed.
        assert!(!window_expired(Duration::from_secs(3600), true));
        assert!(!window_expired(INTERACTIVE_WINDOW, true));
    }

    #[test]
    fn press_classification_uses_hold_threshold() {
        assert_eq!(classify_press(Duration::from_millis(2999)), Press::Short);
        assert_eq!(classify_press(LONG_HOLD), Press::Long);
        assert_eq!(classify_press(Duration::from_secs(10)), Press::Long);
    }
}
