//! # MPU6500 inertial measurement unit driver
//!
//! Six-axis IMU (accelerometer + gyroscope, plus a die thermometer) on the
//! I2C bus, used by the balance controller for attitude feedback.
//!
//! The driver is generic over any blocking [`embedded_hal`] I2C bus. Register
//! transactions retry a few times before failing, since the bus is shared
//! with the servo board and the odd clash is expected.
//!
//! Data-ready signalling supports two modes:
//!
//! - **Polled**: [`Mpu6500::is_data_ready`] reads the interrupt status
//!   register directly.
//! - **Flag**: after [`Mpu6500::arm_interrupt`] the chip raises its INT line
//!   on each new sample; the platform layer's pin handler calls
//!   [`DataReadyFlag::set`] on a clone of the driver's flag, and
//!   `is_data_ready` consumes the flag without touching the bus.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use embedded_hal::blocking::i2c::{Write, WriteRead};
use log::{info, warn};
use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

// Register map
const WHO_AM_I: u8 = 0x75;
const PWR_MGMT_1: u8 = 0x6B;
const CONFIG: u8 = 0x1A;
const GYRO_CONFIG: u8 = 0x1B;
const ACCEL_CONFIG: u8 = 0x1C;
const ACCEL_CONFIG2: u8 = 0x1D;
const SMPLRT_DIV: u8 = 0x19;
const INT_PIN_CFG: u8 = 0x37;
const INT_ENABLE: u8 = 0x38;
const INT_STATUS: u8 = 0x3A;
const ACCEL_XOUT_H: u8 = 0x3B;
const TEMP_OUT_H: u8 = 0x41;
const GYRO_XOUT_H: u8 = 0x43;

/// WHO_AM_I values for the chip revisions this driver accepts.
const KNOWN_CHIP_IDS: [u8; 3] = [0x70, 0x71, 0x73];

/// Attempts per register transaction before giving up.
const REG_RETRIES: u32 = 3;

/// Pause between register transaction retries.
///
/// Units: milliseconds
const RETRY_DELAY_MS: u64 = 5;

/// Pause between gyro calibration samples.
///
/// Units: milliseconds
const CALIB_SAMPLE_DELAY_MS: u64 = 5;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur talking to the IMU.
#[derive(Debug, Error)]
pub enum ImuError {
    /// An I2C transaction failed after all retries.
    #[error("An I2C error occured")]
    I2c,

    #[error("MPU6500 not found, WHO_AM_I read 0x{0:02X}")]
    BadChipId(u8),

    #[error("Gyro calibration failed, only {good}/{total} samples valid")]
    CalibrationFailed { good: usize, total: usize },
}

/// Gyroscope full scale range.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
pub enum GyroFs {
    #[serde(rename = "250dps")]
    Dps250,
    #[serde(rename = "500dps")]
    Dps500,
    #[serde(rename = "1000dps")]
    Dps1000,
    #[serde(rename = "2000dps")]
    Dps2000,
}

/// Accelerometer full scale range.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
pub enum AccelFs {
    #[serde(rename = "2g")]
    G2,
    #[serde(rename = "4g")]
    G4,
    #[serde(rename = "8g")]
    G8,
    #[serde(rename = "16g")]
    G16,
}

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Parameters for the IMU driver.
#[derive(Clone, Debug, Deserialize)]
pub struct ImuConfig {
    /// I2C bus address of the chip.
    pub addr: u8,

    /// Gyroscope full scale range.
    pub gyro_fs: GyroFs,

    /// Accelerometer full scale range.
    pub accel_fs: AccelFs,

    /// Sample rate divider, output rate is `1 kHz / (1 + divider)`.
    pub smplrt_div: u8,

    /// Digital low pass filter setting, applied to both gyro and accel.
    pub dlpf: u8,

    /// Number of samples averaged for the gyro bias.
    pub calib_samples: usize,
}

/// One full IMU reading.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ImuSample {
    /// Acceleration per axis.
    ///
    /// Units: g
    pub accel_g: [f64; 3],

    /// Bias-corrected angular rate per axis.
    ///
    /// Units: degrees/second
    pub gyro_dps: [f64; 3],

    /// Die temperature.
    ///
    /// Units: degrees Celsius
    pub temperature_c: f64,
}

/// Shared data-ready flag, set by the platform's INT pin handler and
/// consumed by [`Mpu6500::is_data_ready`]. Clones share the same flag.
#[derive(Clone, Debug, Default)]
pub struct DataReadyFlag(Arc<AtomicBool>);

/// The MPU6500 driver itself.
pub struct Mpu6500<I2C> {
    i2c: I2C,
    addr: u8,
    gyro_fs: GyroFs,
    accel_fs: AccelFs,
    smplrt_div: u8,
    dlpf: u8,

    /// Gyro bias measured by [`Mpu6500::calibrate_gyro`], subtracted from
    /// every scaled gyro reading.
    ///
    /// Units: degrees/second
    gyro_bias_dps: [f64; 3],

    data_ready: DataReadyFlag,

    /// Whether the INT registers have been configured.
    int_configured: bool,

    /// Whether data-ready currently comes from the flag rather than the
    /// status register.
    int_active: bool,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl GyroFs {
    /// The GYRO_CONFIG bit pattern for this range.
    pub fn reg_bits(self) -> u8 {
        match self {
            GyroFs::Dps250 => 0x00,
            GyroFs::Dps500 => 0x08,
            GyroFs::Dps1000 => 0x10,
            GyroFs::Dps2000 => 0x18,
        }
    }

    /// Raw counts per degree-per-second at this range.
    pub fn scale(self) -> f64 {
        match self {
            GyroFs::Dps250 => 131.0,
            GyroFs::Dps500 => 65.5,
            GyroFs::Dps1000 => 32.8,
            GyroFs::Dps2000 => 16.4,
        }
    }
}

impl AccelFs {
    /// The ACCEL_CONFIG bit pattern for this range.
    pub fn reg_bits(self) -> u8 {
        match self {
            AccelFs::G2 => 0x00,
            AccelFs::G4 => 0x08,
            AccelFs::G8 => 0x10,
            AccelFs::G16 => 0x18,
        }
    }

    /// Raw counts per g at this range.
    pub fn scale(self) -> f64 {
        match self {
            AccelFs::G2 => 16384.0,
            AccelFs::G4 => 8192.0,
            AccelFs::G8 => 4096.0,
            AccelFs::G16 => 2048.0,
        }
    }
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            addr: 0x68,
            gyro_fs: GyroFs::Dps500,
            accel_fs: AccelFs::G4,
            smplrt_div: 9,
            dlpf: 0x03,
            calib_samples: 200,
        }
    }
}

impl DataReadyFlag {
    /// Mark new data available. Safe to call from an interrupt handler.
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Consume the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<I2C, E> Mpu6500<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
{
    /// Probe and configure the chip.
    ///
    /// Fails without writing any configuration if the WHO_AM_I value is not
    /// a known chip revision.
    pub fn new(i2c: I2C, config: &ImuConfig) -> Result<Self, ImuError> {
        let mut imu = Self {
            i2c,
            addr: config.addr,
            gyro_fs: config.gyro_fs,
            accel_fs: config.accel_fs,
            smplrt_div: config.smplrt_div,
            dlpf: config.dlpf,
            gyro_bias_dps: [0.0; 3],
            data_ready: DataReadyFlag::default(),
            int_configured: false,
            int_active: false,
        };

        imu.init_sensor()?;
        Ok(imu)
    }

    /// A clone of the data-ready flag, for the platform's INT pin handler.
    pub fn data_ready_flag(&self) -> DataReadyFlag {
        self.data_ready.clone()
    }

    /// Configure the chip's INT line for latched data-ready pulses and
    /// switch data-ready detection over to the shared flag.
    pub fn arm_interrupt(&mut self) -> Result<(), ImuError> {
        // Latch the INT line, clear on any read
        self.write_reg(INT_PIN_CFG, 0x30)?;
        thread::sleep(Duration::from_millis(10));

        self.write_reg(INT_ENABLE, 0x01)?;
        thread::sleep(Duration::from_millis(10));

        // Clear anything already pending
        self.read_reg(INT_STATUS)?;
        thread::sleep(Duration::from_millis(10));

        self.data_ready.clear();
        self.int_configured = true;
        self.int_active = true;

        thread::sleep(Duration::from_millis(50));
        info!("MPU6500 data-ready interrupt armed");
        Ok(())
    }

    /// Stop honouring the data-ready flag, falling back to polled mode.
    pub fn disable_interrupt(&mut self) {
        self.int_active = false;
        self.data_ready.clear();
    }

    /// Resume flag-based data-ready detection after a
    /// [`Mpu6500::disable_interrupt`].
    pub fn enable_interrupt(&mut self) {
        if self.int_configured {
            // Discard any status latched while we were not listening
            let _ = self.read_reg(INT_STATUS);
            self.data_ready.clear();
            self.int_active = true;
        }
    }

    /// Whether a new sample is available.
    pub fn is_data_ready(&mut self) -> Result<bool, ImuError> {
        if self.int_active {
            Ok(self.data_ready.take())
        } else {
            let status = self.read_reg(INT_STATUS)?;
            Ok(status & 0x01 != 0)
        }
    }

    /// Raw accelerometer counts per axis.
    pub fn accel_raw(&mut self) -> Result<[i16; 3], ImuError> {
        let mut buf = [0u8; 6];
        self.read_regs(ACCEL_XOUT_H, &mut buf)?;
        Ok(unpack_axes(&buf))
    }

    /// Acceleration per axis in g.
    pub fn accel_g(&mut self) -> Result<[f64; 3], ImuError> {
        let raw = self.accel_raw()?;
        let scale = self.accel_fs.scale();
        Ok([
            raw[0] as f64 / scale,
            raw[1] as f64 / scale,
            raw[2] as f64 / scale,
        ])
    }

    /// Raw gyroscope counts per axis.
    pub fn gyro_raw(&mut self) -> Result<[i16; 3], ImuError> {
        let mut buf = [0u8; 6];
        self.read_regs(GYRO_XOUT_H, &mut buf)?;
        Ok(unpack_axes(&buf))
    }

    /// Bias-corrected angular rate per axis in degrees/second.
    pub fn gyro_dps(&mut self) -> Result<[f64; 3], ImuError> {
        let raw = self.gyro_raw()?;
        let scale = self.gyro_fs.scale();
        Ok([
            raw[0] as f64 / scale - self.gyro_bias_dps[0],
            raw[1] as f64 / scale - self.gyro_bias_dps[1],
            raw[2] as f64 / scale - self.gyro_bias_dps[2],
        ])
    }

    /// Read accel, temperature and gyro in a single 14 byte burst.
    pub fn read_all(&mut self) -> Result<ImuSample, ImuError> {
        let mut buf = [0u8; 14];
        self.read_regs(ACCEL_XOUT_H, &mut buf)?;

        let accel_raw = unpack_axes(&buf[0..6]);
        let temp_raw = i16::from_be_bytes([buf[6], buf[7]]);
        let gyro_raw = unpack_axes(&buf[8..14]);

        let accel_scale = self.accel_fs.scale();
        let gyro_scale = self.gyro_fs.scale();

        Ok(ImuSample {
            accel_g: [
                accel_raw[0] as f64 / accel_scale,
                accel_raw[1] as f64 / accel_scale,
                accel_raw[2] as f64 / accel_scale,
            ],
            gyro_dps: [
                gyro_raw[0] as f64 / gyro_scale - self.gyro_bias_dps[0],
                gyro_raw[1] as f64 / gyro_scale - self.gyro_bias_dps[1],
                gyro_raw[2] as f64 / gyro_scale - self.gyro_bias_dps[2],
            ],
            temperature_c: temp_c_from_raw(temp_raw),
        })
    }

    /// Die temperature in degrees Celsius.
    pub fn temperature_c(&mut self) -> Result<f64, ImuError> {
        let mut buf = [0u8; 2];
        self.read_regs(TEMP_OUT_H, &mut buf)?;
        Ok(temp_c_from_raw(i16::from_be_bytes([buf[0], buf[1]])))
    }

    /// Measure the gyro bias by averaging `samples` readings. The robot must
    /// be completely still for the duration.
    ///
    /// Individual read failures are discarded; if fewer than half the
    /// samples succeed the prior bias is kept and an error returned.
    pub fn calibrate_gyro(&mut self, samples: usize) -> Result<[f64; 3], ImuError> {
        info!("Calibrating gyro bias, keep the robot still");

        let was_active = self.int_active;
        if was_active {
            self.disable_interrupt();
            thread::sleep(Duration::from_millis(20));
        }

        let scale = self.gyro_fs.scale();
        let mut sum_dps = [0.0f64; 3];
        let mut good = 0usize;

        for i in 0..samples {
            match self.gyro_raw() {
                Ok(raw) => {
                    for axis in 0..3 {
                        sum_dps[axis] += raw[axis] as f64 / scale;
                    }
                    good += 1;
                }
                Err(_) => {
                    warn!("Gyro read error on calibration sample {}", i);
                    thread::sleep(Duration::from_millis(10));
                }
            }
            thread::sleep(Duration::from_millis(CALIB_SAMPLE_DELAY_MS));
        }

        if good < samples / 2 {
            if was_active {
                self.enable_interrupt();
            }
            return Err(ImuError::CalibrationFailed {
                good,
                total: samples,
            });
        }

        for axis in 0..3 {
            self.gyro_bias_dps[axis] = sum_dps[axis] / good as f64;
        }

        info!(
            "Gyro bias: X={:.3}, Y={:.3}, Z={:.3} deg/s ({}/{} samples)",
            self.gyro_bias_dps[0], self.gyro_bias_dps[1], self.gyro_bias_dps[2], good, samples
        );

        if was_active {
            thread::sleep(Duration::from_millis(20));
            self.enable_interrupt();
        }

        Ok(self.gyro_bias_dps)
    }

    /// Whether the chip answers with a known WHO_AM_I value.
    pub fn is_connected(&mut self) -> bool {
        match self.read_reg(WHO_AM_I) {
            Ok(id) => KNOWN_CHIP_IDS.contains(&id),
            Err(_) => false,
        }
    }

    /// Hard reset the chip and reconfigure it, re-arming the interrupt if it
    /// was armed.
    pub fn reset(&mut self) -> Result<(), ImuError> {
        info!("Resetting MPU6500");

        if self.int_active {
            self.disable_interrupt();
        }

        self.write_reg(PWR_MGMT_1, 0x80)?;
        thread::sleep(Duration::from_millis(100));

        self.init_sensor()?;

        if self.int_configured {
            self.arm_interrupt()?;
        }

        Ok(())
    }

    // ---- PRIVATE ----

    fn init_sensor(&mut self) -> Result<(), ImuError> {
        let id = self.read_reg(WHO_AM_I)?;
        if !KNOWN_CHIP_IDS.contains(&id) {
            return Err(ImuError::BadChipId(id));
        }

        // Wake up
        self.write_reg(PWR_MGMT_1, 0x00)?;
        thread::sleep(Duration::from_millis(10));

        // Reset
        self.write_reg(PWR_MGMT_1, 0x80)?;
        thread::sleep(Duration::from_millis(100));

        // Clock source: PLL with gyro reference
        self.write_reg(PWR_MGMT_1, 0x01)?;
        thread::sleep(Duration::from_millis(10));

        self.write_reg(GYRO_CONFIG, self.gyro_fs.reg_bits())?;
        self.write_reg(ACCEL_CONFIG, self.accel_fs.reg_bits())?;

        // Output rate is 1 kHz / (1 + divider)
        self.write_reg(SMPLRT_DIV, self.smplrt_div)?;

        // Low pass filter on both sensor paths
        self.write_reg(CONFIG, self.dlpf)?;
        self.write_reg(ACCEL_CONFIG2, self.dlpf)?;

        thread::sleep(Duration::from_millis(50));
        info!("MPU6500 initialised (WHO_AM_I 0x{:02X})", id);
        Ok(())
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), ImuError> {
        let mut attempt = 0;
        loop {
            match self.i2c.write(self.addr, &[reg, value]) {
                Ok(()) => return Ok(()),
                Err(_) => {
                    attempt += 1;
                    if attempt >= REG_RETRIES {
                        return Err(ImuError::I2c);
                    }
                    thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
                }
            }
        }
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, ImuError> {
        let mut buf = [0u8; 1];
        self.read_regs(reg, &mut buf)?;
        Ok(buf[0])
    }

    fn read_regs(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), ImuError> {
        let mut attempt = 0;
        loop {
            match self.i2c.write_read(self.addr, &[reg], buf) {
                Ok(()) => return Ok(()),
                Err(_) => {
                    attempt += 1;
                    if attempt >= REG_RETRIES {
                        return Err(ImuError::I2c);
                    }
                    thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Unpack three big-endian i16 axis values from a 6 byte register block.
fn unpack_axes(buf: &[u8]) -> [i16; 3] {
    [
        i16::from_be_bytes([buf[0], buf[1]]),
        i16::from_be_bytes([buf[2], buf[3]]),
        i16::from_be_bytes([buf[4], buf[5]]),
    ]
}

fn temp_c_from_raw(raw: i16) -> f64 {
    (raw as f64 / 333.87) + 21.0
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[derive(Default)]
    struct MockState {
        who_am_i: u8,
        writes: Vec<(u8, u8)>,
        data: [u8; 14],
        int_status: u8,
        fail_reads: u32,
    }

    #[derive(Clone)]
    struct MockI2c(Rc<RefCell<MockState>>);

    impl MockI2c {
        fn new(who_am_i: u8) -> Self {
            MockI2c(Rc::new(RefCell::new(MockState {
                who_am_i,
                ..MockState::default()
            })))
        }

        fn set_axes(&self, accel: [i16; 3], temp: i16, gyro: [i16; 3]) {
            let mut state = self.0.borrow_mut();
            for i in 0..3 {
                state.data[i * 2..i * 2 + 2].copy_from_slice(&accel[i].to_be_bytes());
                state.data[8 + i * 2..10 + i * 2].copy_from_slice(&gyro[i].to_be_bytes());
            }
            state.data[6..8].copy_from_slice(&temp.to_be_bytes());
        }
    }

    impl Write for MockI2c {
        type Error = ();

        fn write(&mut self, _addr: u8, bytes: &[u8]) -> Result<(), ()> {
            self.0.borrow_mut().writes.push((bytes[0], bytes[1]));
            Ok(())
        }
    }

    impl WriteRead for MockI2c {
        type Error = ();

        fn write_read(&mut self, _addr: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), ()> {
            let mut state = self.0.borrow_mut();

            if state.fail_reads > 0 {
                state.fail_reads -= 1;
                return Err(());
            }

            let reg = bytes[0];
            match reg {
                WHO_AM_I => buffer[0] = state.who_am_i,
                INT_STATUS => buffer[0] = state.int_status,
                ACCEL_XOUT_H => buffer.copy_from_slice(&state.data[..buffer.len()]),
                TEMP_OUT_H => buffer.copy_from_slice(&state.data[6..6 + buffer.len()]),
                GYRO_XOUT_H => buffer.copy_from_slice(&state.data[8..8 + buffer.len()]),
                _ => {
                    for byte in buffer.iter_mut() {
                        *byte = 0;
                    }
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_unknown_chip_rejected_before_config() {
        let bus = MockI2c::new(0x68);

        match Mpu6500::new(bus.clone(), &ImuConfig::default()) {
            Err(ImuError::BadChipId(0x68)) => {}
            other => panic!("expected BadChipId, got {:?}", other.err()),
        }

        // Nothing was written to the misidentified chip
        assert!(bus.0.borrow().writes.is_empty());
    }

    #[test]
    fn test_init_write_sequence() {
        let bus = MockI2c::new(0x71);
        Mpu6500::new(bus.clone(), &ImuConfig::default()).unwrap();

        assert_eq!(
            bus.0.borrow().writes,
            vec![
                (PWR_MGMT_1, 0x00),
                (PWR_MGMT_1, 0x80),
                (PWR_MGMT_1, 0x01),
                (GYRO_CONFIG, 0x08),
                (ACCEL_CONFIG, 0x08),
                (SMPLRT_DIV, 9),
                (CONFIG, 0x03),
                (ACCEL_CONFIG2, 0x03),
            ]
        );
    }

    #[test]
    fn test_burst_read_parses_all_axes() {
        let bus = MockI2c::new(0x70);
        bus.set_axes([8192, -8192, 4096], 0, [655, -655, 131]);

        let mut imu = Mpu6500::new(bus, &ImuConfig::default()).unwrap();
        let sample = imu.read_all().unwrap();

        assert!((sample.accel_g[0] - 1.0).abs() < 1e-9);
        assert!((sample.accel_g[1] + 1.0).abs() < 1e-9);
        assert!((sample.accel_g[2] - 0.5).abs() < 1e-9);
        assert!((sample.gyro_dps[0] - 10.0).abs() < 1e-9);
        assert!((sample.gyro_dps[1] + 10.0).abs() < 1e-9);
        assert!((sample.gyro_dps[2] - 2.0).abs() < 1e-9);
        assert!((sample.temperature_c - 21.0).abs() < 1e-9);

        // The per-sensor reads agree with the burst
        let accel = imu.accel_g().unwrap();
        for axis in 0..3 {
            assert!((accel[axis] - sample.accel_g[axis]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_calibration_sets_and_applies_bias() {
        let bus = MockI2c::new(0x71);
        bus.set_axes([0, 0, 0], 0, [655, 131, -655]);

        let mut imu = Mpu6500::new(bus, &ImuConfig::default()).unwrap();

        let bias = imu.calibrate_gyro(4).unwrap();
        assert!((bias[0] - 10.0).abs() < 1e-9);
        assert!((bias[1] - 2.0).abs() < 1e-9);
        assert!((bias[2] + 10.0).abs() < 1e-9);

        // Corrected rates are now zero
        let gyro = imu.gyro_dps().unwrap();
        for axis in 0..3 {
            assert!(gyro[axis].abs() < 1e-9);
        }
    }

    #[test]
    fn test_failed_calibration_keeps_prior_bias() {
        let bus = MockI2c::new(0x71);
        bus.set_axes([0, 0, 0], 0, [655, 655, 655]);

        let mut imu = Mpu6500::new(bus.clone(), &ImuConfig::default()).unwrap();
        imu.calibrate_gyro(4).unwrap();

        // Every transaction fails, so no sample survives the retries
        bus.0.borrow_mut().fail_reads = 1000;
        match imu.calibrate_gyro(4) {
            Err(ImuError::CalibrationFailed { good: 0, total: 4 }) => {}
            other => panic!("expected CalibrationFailed, got {:?}", other),
        }

        bus.0.borrow_mut().fail_reads = 0;
        let gyro = imu.gyro_dps().unwrap();
        assert!(gyro[0].abs() < 1e-9);
    }

    #[test]
    fn test_calibration_discards_failed_samples() {
        let bus = MockI2c::new(0x71);
        bus.set_axes([0, 0, 0], 0, [655, 655, 655]);

        let mut imu = Mpu6500::new(bus.clone(), &ImuConfig::default()).unwrap();

        // Three consecutive transaction failures kill exactly one sample
        bus.0.borrow_mut().fail_reads = 3;
        let bias = imu.calibrate_gyro(4).unwrap();
        assert!((bias[0] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_data_ready_modes() {
        let bus = MockI2c::new(0x73);
        let mut imu = Mpu6500::new(bus.clone(), &ImuConfig::default()).unwrap();

        // Polled mode reads the status register
        bus.0.borrow_mut().int_status = 0x01;
        assert!(imu.is_data_ready().unwrap());
        bus.0.borrow_mut().int_status = 0x00;
        assert!(!imu.is_data_ready().unwrap());

        // Flag mode consumes the shared flag without touching the bus
        imu.arm_interrupt().unwrap();
        let flag = imu.data_ready_flag();

        assert!(!imu.is_data_ready().unwrap());
        flag.set();
        assert!(imu.is_data_ready().unwrap());
        assert!(!imu.is_data_ready().unwrap());

        // Back to polled after disabling
        imu.disable_interrupt();
        bus.0.borrow_mut().int_status = 0x01;
        assert!(imu.is_data_ready().unwrap());
    }

    #[test]
    fn test_reset_reruns_bringup_and_rearms() {
        let bus = MockI2c::new(0x70);
        let mut imu = Mpu6500::new(bus.clone(), &ImuConfig::default()).unwrap();
        imu.arm_interrupt().unwrap();

        bus.0.borrow_mut().writes.clear();
        imu.reset().unwrap();

        // Full bring-up runs again, followed by the interrupt registers
        let writes = bus.0.borrow().writes.clone();
        assert!(writes.contains(&(PWR_MGMT_1, 0x80)));
        assert!(writes.contains(&(GYRO_CONFIG, 0x08)));
        assert!(writes.contains(&(INT_PIN_CFG, 0x30)));
        assert!(writes.contains(&(INT_ENABLE, 0x01)));

        // Flag mode survives the reset
        let flag = imu.data_ready_flag();
        flag.set();
        assert!(imu.is_data_ready().unwrap());
    }

    #[test]
    fn test_is_connected_tracks_chip_id() {
        let bus = MockI2c::new(0x70);
        let mut imu = Mpu6500::new(bus.clone(), &ImuConfig::default()).unwrap();

        assert!(imu.is_connected());

        bus.0.borrow_mut().who_am_i = 0x00;
        assert!(!imu.is_connected());
    }
}
