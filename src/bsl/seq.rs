//! The BSL entry/exit sequence mini-language (spec.md §4.4): a string
//! of `{R,r,D,d,','}` tokens, optionally followed by `:` and an exit
//! sequence. Uppercase asserts a line, lowercase deasserts it, `,`
//! strobes the current state and sleeps 50 ms. Grounded on
//! `original_source/drivers/bsllib.c`'s `bsllib_seq_do` /
//! `bsllib_seq_do_gpio` / `bsllib_seq_next`.

use std::thread::sleep;
use std::time::Duration;

use crate::error::Result;
use crate::transport::{ModemLines, Transport};

const STROBE_DELAY: Duration = Duration::from_millis(50);

/// Splits `seq` into its entry and exit halves at the first `:`
/// (mirrors `bsllib_seq_next`, which returns the substring after it,
/// or an empty string if there is no `:`).
pub fn split(seq: &str) -> (&str, &str) {
    match seq.find(':') {
        Some(i) => (&seq[..i], &seq[i + 1..]),
        None => (seq, ""),
    }
}

/// Runs one half of a sequence (up to `:` or end of string) against a
/// transport's modem control lines (mirrors `bsllib_seq_do`).
pub fn run_serial(transport: &mut dyn Transport, half: &str) -> Result<()> {
    let mut state = ModemLines::empty();

    for c in half.chars() {
        match c {
            'R' => state.insert(ModemLines::RTS),
            'r' => state.remove(ModemLines::RTS),
            'D' => state.insert(ModemLines::DTR),
            'd' => state.remove(ModemLines::DTR),
            ',' => {
                transport.set_modem(state)?;
                sleep(STROBE_DELAY);
            }
            _ => {}
        }
    }

    transport.set_modem(state)?;
    sleep(STROBE_DELAY);
    Ok(())
}

/// A pair of sysfs GPIO lines driving RTS/DTR in place of the serial
/// port's own modem-control outputs (mirrors `bsllib_seq_do_gpio`,
/// which exports each pin, drives it, then restores whatever export
/// state it found). Logic is inverted relative to [`run_serial`]: the
/// GPIO driving RTS/DTR is active-low, so asserting a line (`R`/`D`)
/// writes `0` and deasserting (`r`/`d`) writes `1`.
#[derive(Debug)]
pub struct GpioPins {
    pub rts: u32,
    pub dtr: u32,
}

impl GpioPins {
    /// Runs one half of a sequence over sysfs GPIO (mirrors
    /// `bsllib_seq_do_gpio`).
    pub fn run(&self, half: &str) -> Result<()> {
        let rts_was_exported = gpio_is_exported(self.rts);
        let dtr_was_exported = gpio_is_exported(self.dtr);

        gpio_export(self.rts)?;
        gpio_set_direction(self.rts)?;
        gpio_export(self.dtr)?;
        gpio_set_direction(self.dtr)?;

        for c in half.chars() {
            match c {
                'R' => gpio_set_value(self.rts, 0)?,
                'r' => gpio_set_value(self.rts, 1)?,
                'D' => gpio_set_value(self.dtr, 0)?,
                'd' => gpio_set_value(self.dtr, 1)?,
                ',' => sleep(STROBE_DELAY),
                _ => {}
            }
        }

        if !rts_was_exported {
            gpio_unexport(self.rts);
        }
        if !dtr_was_exported {
            gpio_unexport(self.dtr);
        }

        sleep(STROBE_DELAY);
        Ok(())
    }
}

fn gpio_is_exported(pin: u32) -> bool {
    std::path::Path::new(&format!("/sys/class/gpio/gpio{}", pin)).exists()
}

fn gpio_export(pin: u32) -> Result<()> {
    if gpio_is_exported(pin) {
        return Ok(());
    }
    std::fs::write("/sys/class/gpio/export", pin.to_string())
        .map_err(|e| crate::error::CoreError::Io(e.to_string()))
}

fn gpio_unexport(pin: u32) {
    let _ = std::fs::write("/sys/class/gpio/unexport", pin.to_string());
}

fn gpio_set_direction(pin: u32) -> Result<()> {
    std::fs::write(format!("/sys/class/gpio/gpio{}/direction", pin), "out")
        .map_err(|e| crate::error::CoreError::Io(e.to_string()))
}

fn gpio_set_value(pin: u32, value: u8) -> Result<()> {
    std::fs::write(format!("/sys/class/gpio/gpio{}/value", pin), value.to_string())
        .map_err(|e| crate::error::CoreError::Io(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_support::LoopbackTransport;

    #[test]
    fn split_finds_colon_boundary() {
        assert_eq!(split("DR,r,R,r,d,R:DR,r"), ("DR,r,R,r,d,R", "DR,r"));
        assert_eq!(split("DR,r"), ("DR,r", ""));
    }

    #[test]
    fn serial_sequence_tracks_asserted_lines() {
        let mut t = LoopbackTransport::default();
        run_serial(&mut t, "DR,r,d").unwrap();
        // After "DR," state is DTR|RTS; "r" clears RTS leaving DTR; "d"
        // clears DTR leaving nothing, then the trailing flush applies
        // the final (empty) state once more.
        assert_eq!(t.modem, ModemLines::empty());
    }

    #[test]
    fn serial_sequence_leaves_uncommaed_tail_applied_once() {
        let mut t = LoopbackTransport::default();
        run_serial(&mut t, "DR").unwrap();
        assert_eq!(t.modem, ModemLines::DTR | ModemLines::RTS);
    }
}
