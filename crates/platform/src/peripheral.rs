//! Peripheral abstraction layer
//!
//! Provides the UART abstraction the control shell runs over.
//! Wraps embedded-hal traits with additional functionality.

/// UART peripheral abstraction
pub trait UartPeripheral {
    /// Error type
    type Error: core::fmt::Debug;

    /// Write data
    fn write(&mut self, data: &[u8])
        -> impl core::future::Future<Output = Result<(), Self::Error>>;

    /// Read data
    fn read(
        &mut self,
        buffer: &mut [u8],
    ) -> impl core::future::Future<Output = Result<(), Self::Error>>;

    /// Write single byte
    fn write_byte(
        &mut self,
        byte: u8,
    ) -> impl core::future::Future<Output = Result<(), Self::Error>> {
        async move { self.write(&[byte]).await }
    }

    /// Read single byte
    fn read_byte(&mut self) -> impl core::future::Future<Output = Result<u8, Self::Error>> {
        async move {
            let mut buf = [0u8];
            self.read(&mut buf).await?;
            Ok(buf[0])
        }
    }

    /// Configure UART
    fn configure(&mut self, config: UartConfig) -> Result<(), Self::Error>;
}

/// UART configuration
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UartConfig {
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits
    pub data_bits: DataBits,
    /// Parity
    pub parity: Parity,
    /// Stop bits
    pub stop_bits: StopBits,
}

impl UartConfig {
    /// Default shell transport configuration: 115200 8N1.
    pub const fn shell_default() -> Self {
        Self {
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

/// Data bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataBits {
    /// 7 data bits
    Seven,
    /// 8 data bits
    Eight,
    /// 9 data bits
    Nine,
}

/// Parity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    /// No parity
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopBits {
    /// 1 stop bit
    One,
    /// 2 stop bits
    Two,
}
