//! Handle bookkeeping for the test service characteristics.

/// CONTROL characteristic index.
pub const CONTROL: u8 = 0;
/// DATA characteristic index.
pub const DATA: u8 = 1;
/// Characteristics in the test service.
pub const CHAR_COUNT: usize = 2;

/// Marks a lookup result that matched a CCCD rather than a value handle.
pub const CCCD_BIT: u8 = 0x80;
/// Lookup result for an unknown handle.
pub const NOT_FOUND: u8 = 0xFF;
/// UUID reported for an unknown handle.
pub const UUID_UNKNOWN: u16 = 0xFFFF;
/// Attribute handle 0 is never valid.
pub const HANDLE_INVALID: u16 = 0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CharEntry {
    pub value_handle: u16,
    pub cccd_handle: u16,
    pub uuid: u16,
}

impl CharEntry {
    const EMPTY: Self = Self {
        value_handle: HANDLE_INVALID,
        cccd_handle: HANDLE_INVALID,
        uuid: 0,
    };
}

/// Fixed table indexed by [`CONTROL`] / [`DATA`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CharTable {
    entries: [CharEntry; CHAR_COUNT],
}

impl Default for CharTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CharTable {
    pub const fn new() -> Self {
        Self {
            entries: [CharEntry::EMPTY; CHAR_COUNT],
        }
    }

    pub fn set(&mut self, idx: u8, entry: CharEntry) {
        if let Some(slot) = self.entries.get_mut(idx as usize) {
            *slot = entry;
        }
    }

    pub fn get(&self, idx: u8) -> Option<&CharEntry> {
        self.entries.get(idx as usize)
    }

    /// Value handle for `idx`, if discovered.
    pub fn value_handle(&self, idx: u8) -> Option<u16> {
        self.get(idx)
            .map(|e| e.value_handle)
            .filter(|&h| h != HANDLE_INVALID)
    }

    /// Resolve a raw handle: value handles first, then CCCDs (tagged with
    /// [`CCCD_BIT`]), else [`NOT_FOUND`].
    pub fn lookup(&self, handle: u16) -> u8 {
        if handle == HANDLE_INVALID {
            return NOT_FOUND;
        }
        if let Some(i) = self.entries.iter().position(|e| e.value_handle == handle) {
            return i as u8;
        }
        if let Some(i) = self.entries.iter().position(|e| e.cccd_handle == handle) {
            return CCCD_BIT | i as u8;
        }
        NOT_FOUND
    }

    /// UUID of the characteristic owning `handle`.
    pub fn uuid_of(&self, handle: u16) -> u16 {
        match self.lookup(handle) {
            NOT_FOUND => UUID_UNKNOWN,
            id => self.entries[(id & !CCCD_BIT) as usize].uuid,
        }
    }

    /// Forget every handle (connection gone).
    pub fn clear(&mut self) {
        self.entries = [CharEntry::EMPTY; CHAR_COUNT];
    }

    pub const fn is_cccd(char_id: u8) -> bool {
        char_id != NOT_FOUND && char_id & CCCD_BIT != 0
    }
}
