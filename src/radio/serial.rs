//! nRF24 modem attached over USB serial
//!
//! The modem firmware drives the radio chip and exchanges SLIP-framed messages
//! with the host:
//!
//! | direction | frame | meaning |
//! |---|---|---|
//! | host → modem | `I ce_lo ce_hi csn_lo csn_hi` | bring up the chip, reply `I status` |
//! | host → modem | `P level` | set power level |
//! | host → modem | `R rate` | set data rate |
//! | host → modem | `S addr_lo addr_hi payload` | send, reply `S status` |
//! | host → modem | `D` | power down |
//! | modem → host | `F from_lo from_hi payload` | inbound mesh frame |
//!
//! A status byte of `1` means success. Inbound `F` frames may arrive at any
//! time, including while a reply is awaited; they are buffered until read.

use super::slip::{slip_encode, SlipDecoder};
use super::{DataRate, PowerLevel, RadioAddress, RadioError, RadioLink};
use serialport::SerialPort;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const MSG_INIT: u8 = b'I';
const MSG_POWER: u8 = b'P';
const MSG_RATE: u8 = b'R';
const MSG_SEND: u8 = b'S';
const MSG_POWER_DOWN: u8 = b'D';
const MSG_FRAME: u8 = b'F';
const STATUS_OK: u8 = 1;

/// Modem protocol over any byte stream
pub struct Modem<P> {
    port: P,
    ce_pin: u16,
    csn_pin: u16,
    decoder: SlipDecoder,
    inbound: VecDeque<(RadioAddress, Vec<u8>)>,
    reply: Option<Vec<u8>>,
    reply_timeout: Duration,
}

impl<P: Read + Write + Send> Modem<P> {
    pub fn new(port: P, ce_pin: u16, csn_pin: u16, reply_timeout: Duration) -> Self {
        Self {
            port,
            ce_pin,
            csn_pin,
            decoder: SlipDecoder::new(),
            inbound: VecDeque::new(),
            reply: None,
            reply_timeout,
        }
    }

    fn write_message(&mut self, message: &[u8]) -> Result<(), RadioError> {
        self.port.write_all(&slip_encode(message))?;
        self.port.flush()?;
        Ok(())
    }

    /// Read whatever the port has; `true` if any bytes arrived
    fn pump(&mut self) -> Result<bool, RadioError> {
        let mut buf = [0u8; 256];
        let n = match self.port.read(&mut buf) {
            Ok(n) => n,
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => 0,
            Err(e) => return Err(e.into()),
        };
        for frame in self.decoder.push(&buf[..n]) {
            self.accept(frame);
        }
        Ok(n > 0)
    }

    fn accept(&mut self, frame: Vec<u8>) {
        match frame.first() {
            Some(&MSG_FRAME) if frame.len() >= 3 => {
                let from = u16::from_le_bytes([frame[1], frame[2]]);
                self.inbound.push_back((from, frame[3..].to_vec()));
            }
            Some(&MSG_FRAME) => warn!(bytes = ?frame, "Truncated inbound frame from modem"),
            Some(_) => self.reply = Some(frame),
            None => {}
        }
    }

    /// Send `message` and wait for the reply carrying the same message type
    fn request(&mut self, message: &[u8]) -> Result<Option<Vec<u8>>, RadioError> {
        self.reply = None;
        self.write_message(message)?;

        let deadline = Instant::now() + self.reply_timeout;
        loop {
            let progressed = self.pump()?;
            if let Some(reply) = self.reply.take() {
                if reply.first() == message.first() {
                    return Ok(Some(reply[1..].to_vec()));
                }
                debug!(bytes = ?reply, "Ignoring unexpected modem reply");
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            if !progressed {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }
}

impl<P: Read + Write + Send> RadioLink for Modem<P> {
    fn begin(&mut self) -> Result<(), RadioError> {
        let [ce_lo, ce_hi] = self.ce_pin.to_le_bytes();
        let [csn_lo, csn_hi] = self.csn_pin.to_le_bytes();
        match self.request(&[MSG_INIT, ce_lo, ce_hi, csn_lo, csn_hi])? {
            Some(status) if status.first() == Some(&STATUS_OK) => Ok(()),
            _ => Err(RadioError::HardwareNotResponding),
        }
    }

    fn set_power_level(&mut self, level: PowerLevel) {
        if let Err(e) = self.write_message(&[MSG_POWER, level.as_byte()]) {
            warn!("Failed to set radio power level: {}", e);
        }
    }

    fn set_data_rate(&mut self, rate: DataRate) {
        if let Err(e) = self.write_message(&[MSG_RATE, rate.as_byte()]) {
            warn!("Failed to set radio data rate: {}", e);
        }
    }

    fn send(&mut self, to: RadioAddress, payload: &[u8]) -> bool {
        let mut message = Vec::with_capacity(payload.len() + 3);
        message.push(MSG_SEND);
        message.extend_from_slice(&to.to_le_bytes());
        message.extend_from_slice(payload);

        match self.request(&message) {
            Ok(Some(status)) => status.first() == Some(&STATUS_OK),
            Ok(None) => {
                debug!(addr = to, "Modem did not acknowledge send");
                false
            }
            Err(e) => {
                warn!(addr = to, "Modem send failed: {}", e);
                false
            }
        }
    }

    fn poll(&mut self) {
        if let Err(e) = self.pump() {
            warn!("Modem read failed: {}", e);
        }
    }

    fn frame_available(&mut self) -> bool {
        !self.inbound.is_empty()
    }

    fn read(&mut self) -> Option<(RadioAddress, Vec<u8>)> {
        self.inbound.pop_front()
    }

    fn power_down(&mut self) {
        if let Err(e) = self.write_message(&[MSG_POWER_DOWN]) {
            warn!("Failed to power down modem: {}", e);
        }
    }
}

/// Serial port settings for [`SerialRadio`]
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub ce_pin: u16,
    pub csn_pin: u16,
    pub reply_timeout: Duration,
}

/// [`Modem`] over a real serial port, opened in [`RadioLink::begin`]
pub struct SerialRadio {
    settings: SerialSettings,
    modem: Option<Modem<Box<dyn SerialPort>>>,
}

impl SerialRadio {
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            settings,
            modem: None,
        }
    }

    fn open_port(&self) -> Result<Box<dyn SerialPort>, RadioError> {
        let SerialSettings {
            port_name,
            baud_rate,
            ..
        } = &self.settings;
        info!("Opening radio modem on {} at {} baud", port_name, baud_rate);

        let mut builder =
            serialport::new(port_name.as_str(), *baud_rate).timeout(Duration::from_millis(20));
        #[cfg(unix)]
        {
            builder = builder
                .data_bits(serialport::DataBits::Eight)
                .stop_bits(serialport::StopBits::One)
                .parity(serialport::Parity::None);
        }
        let mut port = builder.open()?;

        let _ = port.write_data_terminal_ready(true);
        std::thread::sleep(Duration::from_millis(150));
        let _ = port.clear(serialport::ClearBuffer::Input);
        Ok(port)
    }
}

impl RadioLink for SerialRadio {
    fn begin(&mut self) -> Result<(), RadioError> {
        let port = self.open_port()?;
        let mut modem = Modem::new(
            port,
            self.settings.ce_pin,
            self.settings.csn_pin,
            self.settings.reply_timeout,
        );
        modem.begin()?;
        self.modem = Some(modem);
        Ok(())
    }

    fn set_power_level(&mut self, level: PowerLevel) {
        if let Some(modem) = self.modem.as_mut() {
            modem.set_power_level(level);
        }
    }

    fn set_data_rate(&mut self, rate: DataRate) {
        if let Some(modem) = self.modem.as_mut() {
            modem.set_data_rate(rate);
        }
    }

    fn send(&mut self, to: RadioAddress, payload: &[u8]) -> bool {
        self.modem
            .as_mut()
            .is_some_and(|modem| modem.send(to, payload))
    }

    fn poll(&mut self) {
        if let Some(modem) = self.modem.as_mut() {
            modem.poll();
        }
    }

    fn frame_available(&mut self) -> bool {
        self.modem
            .as_mut()
            .is_some_and(|modem| modem.frame_available())
    }

    fn read(&mut self) -> Option<(RadioAddress, Vec<u8>)> {
        self.modem.as_mut().and_then(|modem| modem.read())
    }

    fn power_down(&mut self) {
        if let Some(modem) = self.modem.as_mut() {
            modem.power_down();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// In-memory stand-in for the modem end of the serial line
    #[derive(Clone, Default)]
    struct FakePort {
        incoming: Arc<Mutex<VecDeque<u8>>>,
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl FakePort {
        fn queue(&self, message: &[u8]) {
            self.incoming.lock().unwrap().extend(slip_encode(message));
        }

        fn written_messages(&self) -> Vec<Vec<u8>> {
            SlipDecoder::new().push(&self.written.lock().unwrap())
        }
    }

    impl Read for FakePort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut incoming = self.incoming.lock().unwrap();
            let n = buf.len().min(incoming.len());
            for slot in buf.iter_mut().take(n) {
                *slot = incoming.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for FakePort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn modem(port: &FakePort) -> Modem<FakePort> {
        Modem::new(port.clone(), 25, 0, Duration::from_millis(20))
    }

    #[test]
    fn test_begin_sends_pins_and_checks_status() {
        let port = FakePort::default();
        port.queue(&[MSG_INIT, STATUS_OK]);

        let mut modem = modem(&port);
        assert!(modem.begin().is_ok());
        assert_eq!(port.written_messages(), vec![vec![b'I', 25, 0, 0, 0]]);
    }

    #[test]
    fn test_begin_without_reply_is_hardware_failure() {
        let port = FakePort::default();
        let mut modem = modem(&port);
        assert!(matches!(
            modem.begin(),
            Err(RadioError::HardwareNotResponding)
        ));
    }

    #[test]
    fn test_send_reports_modem_status() {
        let port = FakePort::default();
        let mut modem = modem(&port);

        port.queue(&[MSG_SEND, STATUS_OK]);
        assert!(modem.send(0x0102, b"T\x10"));
        port.queue(&[MSG_SEND, 0]);
        assert!(!modem.send(0x0102, b"T\x10"));

        assert_eq!(
            port.written_messages()[0],
            vec![b'S', 0x02, 0x01, b'T', 0x10]
        );
    }

    #[test]
    fn test_inbound_frames_buffered_during_request() {
        let port = FakePort::default();
        port.queue(&[MSG_FRAME, 7, 0, b'H', 1, 2]);
        port.queue(&[MSG_SEND, STATUS_OK]);

        let mut modem = modem(&port);
        assert!(modem.send(3, b"A"));
        assert!(modem.frame_available());
        assert_eq!(modem.read(), Some((7, vec![b'H', 1, 2])));
        assert!(!modem.frame_available());
    }

    #[test]
    fn test_poll_reads_unsolicited_frames() {
        let port = FakePort::default();
        let mut modem = modem(&port);
        port.queue(&[MSG_FRAME, 0x2C, 0x01, b'A']);

        modem.poll();
        assert_eq!(modem.read(), Some((300, vec![b'A'])));
    }

    #[test]
    fn test_power_down_writes_message() {
        let port = FakePort::default();
        let mut modem = modem(&port);
        modem.power_down();
        assert_eq!(port.written_messages(), vec![vec![MSG_POWER_DOWN]]);
    }
}
