//! SPI transport seam.
//!
//! The chain is a 16-bit, full-duplex SPI slave: every word clocked out
//! clocks one word back. Chip select frames a logical command; it must be
//! released on every exit path, which [`ChipSelect`] guarantees.

/// Word-level access to the SPI link.
pub trait SpiTransport {
    type Error: std::error::Error;

    /// Clock one word out and return the word clocked in.
    ///
    /// # Errors
    ///
    /// Returns the underlying bus error; the caller abandons the frame.
    fn exchange(&mut self, word: u16) -> Result<u16, Self::Error>;

    /// Drive chip select. `true` asserts (selects the chain).
    fn set_chip_select(&mut self, active: bool);

    /// Busy-wait for `micros` microseconds.
    fn delay_us(&mut self, micros: u32);
}

impl<T: SpiTransport + ?Sized> SpiTransport for &mut T {
    type Error = T::Error;

    fn exchange(&mut self, word: u16) -> Result<u16, Self::Error> {
        (**self).exchange(word)
    }

    fn set_chip_select(&mut self, active: bool) {
        (**self).set_chip_select(active);
    }

    fn delay_us(&mut self, micros: u32) {
        (**self).delay_us(micros);
    }
}

/// Chip select held for the lifetime of the guard.
pub struct ChipSelect<'a, T: SpiTransport + ?Sized> {
    bus: &'a mut T,
}

impl<'a, T: SpiTransport + ?Sized> ChipSelect<'a, T> {
    /// Assert chip select.
    pub fn assert(bus: &'a mut T) -> Self {
        bus.set_chip_select(true);
        Self { bus }
    }

    /// # Errors
    ///
    /// Returns the underlying bus error.
    pub fn exchange(&mut self, word: u16) -> Result<u16, T::Error> {
        self.bus.exchange(word)
    }

    /// Clock out every word of `words`, discarding the replies.
    ///
    /// # Errors
    ///
    /// Stops at the first bus error.
    pub fn write_all(&mut self, words: &[u16]) -> Result<(), T::Error> {
        for &word in words {
            self.bus.exchange(word)?;
        }
        Ok(())
    }
}

impl<T: SpiTransport + ?Sized> Drop for ChipSelect<'_, T> {
    fn drop(&mut self) {
        self.bus.set_chip_select(false);
    }
}
