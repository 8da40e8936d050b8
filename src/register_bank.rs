//! In-memory register bank
//!
//! Reference [`DataStore`] backing the server with four flat tables: coils,
//! discrete inputs, holding registers, and input registers. Out-of-range
//! accesses raise [`ModbusException::IllegalDataAddress`]; every in-range
//! access is permitted regardless of unit ID or role. Applications that need
//! side effects or authorization implement [`DataStore`] themselves.

use parking_lot::{Condvar, Mutex};

use crate::error::{ModbusError, ModbusResult};
use crate::protocol::ModbusException;
use crate::server::{AccessContext, DataStore};

/// Elements allocated per table by [`ModbusRegisterBank::new`]
pub const DEFAULT_BANK_SIZE: usize = 10000;

/// Access counters, one snapshot per call to [`ModbusRegisterBank::stats`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisterBankStats {
    /// Elements read through the [`DataStore`] interface
    pub reads: u64,
    /// Elements committed through the [`DataStore`] interface
    pub writes: u64,
}

struct BankData {
    coils: Vec<bool>,
    discrete_inputs: Vec<bool>,
    holding_registers: Vec<u16>,
    input_registers: Vec<u16>,
    stats: RegisterBankStats,
}

/// Thread-safe in-memory data store
///
/// The engine's lock/unlock bracket maps to a binary semaphore here, so
/// concurrent connections serialize whole requests against the bank rather
/// than single element accesses.
pub struct ModbusRegisterBank {
    data: Mutex<BankData>,
    busy: Mutex<bool>,
    released: Condvar,
}

impl ModbusRegisterBank {
    /// Create a bank with [`DEFAULT_BANK_SIZE`] elements in every table
    pub fn new() -> Self {
        Self::with_capacity(
            DEFAULT_BANK_SIZE,
            DEFAULT_BANK_SIZE,
            DEFAULT_BANK_SIZE,
            DEFAULT_BANK_SIZE,
        )
    }

    /// Create a bank with explicit table sizes
    ///
    /// Valid addresses in each table are `0..size`. A size of zero removes
    /// the table: every access to it raises
    /// [`ModbusException::IllegalDataAddress`].
    pub fn with_capacity(
        coils: usize,
        discrete_inputs: usize,
        holding_registers: usize,
        input_registers: usize,
    ) -> Self {
        Self {
            data: Mutex::new(BankData {
                coils: vec![false; coils],
                discrete_inputs: vec![false; discrete_inputs],
                holding_registers: vec![0; holding_registers],
                input_registers: vec![0; input_registers],
                stats: RegisterBankStats::default(),
            }),
            busy: Mutex::new(false),
            released: Condvar::new(),
        }
    }

    /// Access counters
    pub fn stats(&self) -> RegisterBankStats {
        self.data.lock().stats
    }

    /// Seed one coil
    pub fn set_coil(&self, address: u16, value: bool) -> ModbusResult<()> {
        let mut data = self.data.lock();
        let slot = data
            .coils
            .get_mut(address as usize)
            .ok_or_else(|| ModbusError::invalid_data(format!("Coil {} out of range", address)))?;
        *slot = value;
        Ok(())
    }

    /// Seed one discrete input
    pub fn set_discrete_input(&self, address: u16, value: bool) -> ModbusResult<()> {
        let mut data = self.data.lock();
        let slot = data.discrete_inputs.get_mut(address as usize).ok_or_else(|| {
            ModbusError::invalid_data(format!("Discrete input {} out of range", address))
        })?;
        *slot = value;
        Ok(())
    }

    /// Seed one holding register
    pub fn set_holding_register(&self, address: u16, value: u16) -> ModbusResult<()> {
        let mut data = self.data.lock();
        let slot = data.holding_registers.get_mut(address as usize).ok_or_else(|| {
            ModbusError::invalid_data(format!("Holding register {} out of range", address))
        })?;
        *slot = value;
        Ok(())
    }

    /// Seed one input register
    pub fn set_input_register(&self, address: u16, value: u16) -> ModbusResult<()> {
        let mut data = self.data.lock();
        let slot = data.input_registers.get_mut(address as usize).ok_or_else(|| {
            ModbusError::invalid_data(format!("Input register {} out of range", address))
        })?;
        *slot = value;
        Ok(())
    }

    /// Current value of one coil, `None` when out of range
    pub fn coil(&self, address: u16) -> Option<bool> {
        self.data.lock().coils.get(address as usize).copied()
    }

    /// Current value of one discrete input, `None` when out of range
    pub fn discrete_input(&self, address: u16) -> Option<bool> {
        self.data
            .lock()
            .discrete_inputs
            .get(address as usize)
            .copied()
    }

    /// Current value of one holding register, `None` when out of range
    pub fn holding_register(&self, address: u16) -> Option<u16> {
        self.data
            .lock()
            .holding_registers
            .get(address as usize)
            .copied()
    }

    /// Current value of one input register, `None` when out of range
    pub fn input_register(&self, address: u16) -> Option<u16> {
        self.data
            .lock()
            .input_registers
            .get(address as usize)
            .copied()
    }
}

impl Default for ModbusRegisterBank {
    fn default() -> Self {
        Self::new()
    }
}

impl DataStore for ModbusRegisterBank {
    fn lock(&self) {
        let mut busy = self.busy.lock();
        while *busy {
            self.released.wait(&mut busy);
        }
        *busy = true;
    }

    fn unlock(&self) {
        let mut busy = self.busy.lock();
        *busy = false;
        self.released.notify_one();
    }

    fn read_coil(
        &self,
        _access: &AccessContext<'_>,
        address: u16,
    ) -> Result<bool, ModbusException> {
        let mut data = self.data.lock();
        let value = data
            .coils
            .get(address as usize)
            .copied()
            .ok_or(ModbusException::IllegalDataAddress)?;
        data.stats.reads += 1;
        Ok(value)
    }

    fn read_discrete_input(
        &self,
        _access: &AccessContext<'_>,
        address: u16,
    ) -> Result<bool, ModbusException> {
        let mut data = self.data.lock();
        let value = data
            .discrete_inputs
            .get(address as usize)
            .copied()
            .ok_or(ModbusException::IllegalDataAddress)?;
        data.stats.reads += 1;
        Ok(value)
    }

    fn write_coil(
        &self,
        _access: &AccessContext<'_>,
        address: u16,
        value: bool,
        commit: bool,
    ) -> Result<(), ModbusException> {
        let mut data = self.data.lock();
        let slot = data
            .coils
            .get_mut(address as usize)
            .ok_or(ModbusException::IllegalDataAddress)?;
        if commit {
            *slot = value;
            data.stats.writes += 1;
        }
        Ok(())
    }

    fn read_holding_register(
        &self,
        _access: &AccessContext<'_>,
        address: u16,
    ) -> Result<u16, ModbusException> {
        let mut data = self.data.lock();
        let value = data
            .holding_registers
            .get(address as usize)
            .copied()
            .ok_or(ModbusException::IllegalDataAddress)?;
        data.stats.reads += 1;
        Ok(value)
    }

    fn read_input_register(
        &self,
        _access: &AccessContext<'_>,
        address: u16,
    ) -> Result<u16, ModbusException> {
        let mut data = self.data.lock();
        let value = data
            .input_registers
            .get(address as usize)
            .copied()
            .ok_or(ModbusException::IllegalDataAddress)?;
        data.stats.reads += 1;
        Ok(value)
    }

    fn write_register(
        &self,
        _access: &AccessContext<'_>,
        address: u16,
        value: u16,
        commit: bool,
    ) -> Result<(), ModbusException> {
        let mut data = self.data.lock();
        let slot = data
            .holding_registers
            .get_mut(address as usize)
            .ok_or(ModbusException::IllegalDataAddress)?;
        if commit {
            *slot = value;
            data.stats.writes += 1;
        }
        Ok(())
    }
}
