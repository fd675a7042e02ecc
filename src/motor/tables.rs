//! Control tables for the two supported servo families.
//!
//! Registers are addressed by name so calling code never hard-codes wire
//! addresses. The two families disagree on almost everything: Dynamixel X
//! uses 4-byte two's-complement positions, Feetech STS uses 2-byte
//! sign-magnitude fields with the sign bit at 15, 11 or 10 depending on
//! the register.

use super::control_table::{Access, Encoding, RegisterEntry};

/// Servo family of a motor on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// Dynamixel X series (XL330, XL430), protocol 2.0
    DynamixelX,
    /// Feetech STS series (STS3215), protocol 0
    FeetechSts,
}

/// Named register, resolved to a wire address per family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    ModelNumber,
    Id,
    BaudRate,
    DriveMode,
    OperatingMode,
    HomingOffset,
    MinPositionLimit,
    MaxPositionLimit,
    TorqueEnable,
    Acceleration,
    GoalPosition,
    GoalVelocity,
    PresentPosition,
    PresentVelocity,
    PresentLoad,
    PresentVoltage,
    PresentTemperature,
    PresentCurrent,
    Lock,
    PositionPGain,
    PositionIGain,
    PositionDGain,
}

impl Register {
    /// Stable name for logs and error reports
    pub fn name(&self) -> &'static str {
        match self {
            Register::ModelNumber => "Model_Number",
            Register::Id => "ID",
            Register::BaudRate => "Baud_Rate",
            Register::DriveMode => "Drive_Mode",
            Register::OperatingMode => "Operating_Mode",
            Register::HomingOffset => "Homing_Offset",
            Register::MinPositionLimit => "Min_Position_Limit",
            Register::MaxPositionLimit => "Max_Position_Limit",
            Register::TorqueEnable => "Torque_Enable",
            Register::Acceleration => "Acceleration",
            Register::GoalPosition => "Goal_Position",
            Register::GoalVelocity => "Goal_Velocity",
            Register::PresentPosition => "Present_Position",
            Register::PresentVelocity => "Present_Velocity",
            Register::PresentLoad => "Present_Load",
            Register::PresentVoltage => "Present_Voltage",
            Register::PresentTemperature => "Present_Temperature",
            Register::PresentCurrent => "Present_Current",
            Register::Lock => "Lock",
            Register::PositionPGain => "Position_P_Gain",
            Register::PositionIGain => "Position_I_Gain",
            Register::PositionDGain => "Position_D_Gain",
        }
    }
}

/// Bounded retry counts for bus transactions.
///
/// Reads are retried more aggressively than writes: a lost status packet
/// is common, while re-sending a write risks duplicated side effects.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts for a read/sync_read transaction
    pub read: u32,
    /// Attempts for a write/sync_write transaction
    pub write: u32,
}

const fn entry(address: u16, width: u8, encoding: Encoding, access: Access) -> RegisterEntry {
    RegisterEntry {
        address,
        width,
        encoding,
        access,
        needs_calibration: false,
    }
}

const fn position(address: u16, width: u8, encoding: Encoding) -> RegisterEntry {
    RegisterEntry {
        address,
        width,
        encoding,
        access: Access::ReadWrite,
        needs_calibration: true,
    }
}

impl Family {
    /// Encoder counts per full revolution
    pub fn resolution(&self) -> u32 {
        match self {
            Family::DynamixelX => 4096,
            Family::FeetechSts => 4096,
        }
    }

    /// Retry policy for this family's bus transactions
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            // Feetech status packets get lost often enough at 1 Mbaud that
            // a generous read retry count is needed for a stable loop.
            Family::FeetechSts => RetryPolicy { read: 10, write: 2 },
            Family::DynamixelX => RetryPolicy { read: 3, write: 2 },
        }
    }

    /// Resolve a named register to its wire entry, if this family has it
    pub fn lookup(&self, register: Register) -> Option<RegisterEntry> {
        use Access::{Read, ReadWrite};
        use Encoding::{SignMagnitude, TwosComplement, Unsigned};
        match self {
            Family::DynamixelX => Some(match register {
                Register::ModelNumber => entry(0, 2, Unsigned, Read),
                Register::Id => entry(7, 1, Unsigned, ReadWrite),
                Register::BaudRate => entry(8, 1, Unsigned, ReadWrite),
                Register::DriveMode => entry(10, 1, Unsigned, ReadWrite),
                Register::OperatingMode => entry(11, 1, Unsigned, ReadWrite),
                Register::HomingOffset => entry(20, 4, TwosComplement, ReadWrite),
                Register::MaxPositionLimit => entry(48, 4, Unsigned, ReadWrite),
                Register::MinPositionLimit => entry(52, 4, Unsigned, ReadWrite),
                Register::TorqueEnable => entry(64, 1, Unsigned, ReadWrite),
                Register::PositionDGain => entry(80, 2, Unsigned, ReadWrite),
                Register::PositionIGain => entry(82, 2, Unsigned, ReadWrite),
                Register::PositionPGain => entry(84, 2, Unsigned, ReadWrite),
                Register::Acceleration => entry(108, 4, Unsigned, ReadWrite),
                Register::GoalVelocity => entry(104, 4, TwosComplement, ReadWrite),
                Register::GoalPosition => position(116, 4, TwosComplement),
                Register::PresentCurrent => entry(126, 2, TwosComplement, Read),
                Register::PresentVelocity => entry(128, 4, TwosComplement, Read),
                Register::PresentPosition => {
                    let mut e = position(132, 4, TwosComplement);
                    e.access = Read;
                    e
                }
                Register::PresentVoltage => entry(144, 2, Unsigned, Read),
                Register::PresentTemperature => entry(146, 1, Unsigned, Read),
                Register::PresentLoad => return None,
                Register::Lock => return None,
            }),
            Family::FeetechSts => Some(match register {
                Register::ModelNumber => entry(3, 2, Unsigned, Read),
                Register::Id => entry(5, 1, Unsigned, ReadWrite),
                Register::BaudRate => entry(6, 1, Unsigned, ReadWrite),
                Register::MinPositionLimit => entry(9, 2, Unsigned, ReadWrite),
                Register::MaxPositionLimit => entry(11, 2, Unsigned, ReadWrite),
                Register::PositionPGain => entry(21, 1, Unsigned, ReadWrite),
                Register::PositionDGain => entry(22, 1, Unsigned, ReadWrite),
                Register::PositionIGain => entry(23, 1, Unsigned, ReadWrite),
                Register::HomingOffset => entry(31, 2, SignMagnitude(11), ReadWrite),
                Register::OperatingMode => entry(33, 1, Unsigned, ReadWrite),
                Register::TorqueEnable => entry(40, 1, Unsigned, ReadWrite),
                Register::Acceleration => entry(41, 1, Unsigned, ReadWrite),
                Register::GoalPosition => position(42, 2, SignMagnitude(15)),
                Register::GoalVelocity => entry(46, 2, SignMagnitude(15), ReadWrite),
                Register::Lock => entry(55, 1, Unsigned, ReadWrite),
                Register::PresentPosition => {
                    let mut e = position(56, 2, SignMagnitude(15));
                    e.access = Read;
                    e
                }
                Register::PresentVelocity => entry(58, 2, SignMagnitude(15), Read),
                Register::PresentLoad => entry(60, 2, SignMagnitude(10), Read),
                Register::PresentVoltage => entry(62, 1, Unsigned, Read),
                Register::PresentTemperature => entry(63, 1, Unsigned, Read),
                Register::PresentCurrent => entry(69, 2, SignMagnitude(15), Read),
                Register::DriveMode => return None,
            }),
        }
    }
}
