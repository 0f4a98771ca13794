//! Register-level constants of the Home Heat Control unit
//!
//! Sentinel raw values and the status code tables. The labels are the exact strings
//! reported to consumers and must not be translated or reworded.

// ============================================================================
// Modbus Limits
// ============================================================================

/// Maximum number of registers for FC03 (Read Holding Registers)
///
/// Response PDU: function code (1) + byte count (1) + N × 2 ≤ 253 → N ≤ 125
pub const MODBUS_MAX_READ_REGISTERS: u16 = 125;

/// Maximum number of registers for FC16 (Write Multiple Registers)
pub const MODBUS_MAX_WRITE_REGISTERS: usize = 123;

/// Default Modbus TCP port
pub const DEFAULT_PORT: u16 = 502;

/// Default unit id of the controller
pub const DEFAULT_UNIT_ID: u8 = 0;

/// Default scan interval in seconds
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 5;

/// Lower bound for the connect and I/O timeout in seconds
pub const MIN_IO_TIMEOUT_SECS: u64 = 3;

/// Staleness window as a multiple of the scan interval
pub const DEFAULT_STALE_FACTOR: u32 = 3;

// ============================================================================
// Sentinel Values
// ============================================================================

/// Signed temperature: sensor not fitted
pub const TEMPERATURE_NOT_FITTED: i16 = 0x7FFD;
/// Signed temperature: sensor initializing
pub const TEMPERATURE_INIT: i16 = 0x7FFE;
/// Signed temperature: sensor fault
pub const TEMPERATURE_FAULT: i16 = 0x7FFF;

/// Fill level: sensor not fitted
pub const FILL_LEVEL_NOT_FITTED: u16 = 0xFFFE;
/// Fill level: reading invalid
pub const FILL_LEVEL_INVALID: u16 = 0xFFFF;

/// Upper bound of percentage/position registers
pub const PERCENTAGE_MAX: u16 = 100;

pub const LABEL_INIT: &str = "Init";
pub const LABEL_FAULT: &str = "Fehler";
pub const LABEL_INVALID: &str = "Ungültig";

// ============================================================================
// Status Code Tables
// ============================================================================

/// Heat circuit operating status
pub const HEAT_CIRCUIT_STATUS: &[(u16, &str)] = &[
    (0, "Nicht verbaut"),
    (1, "Aus - Manuell"),
    (2, "Aus - Timer"),
    (3, "Nachtbetrieb - Manuell"),
    (4, "Nachtbetrieb - Timer"),
    (5, "Tagbetrieb - Manuell"),
    (6, "Tagbetrieb - Timer"),
    (7, "Fehler"),
];

/// Pump status (heat circuits, charge pumps, circulation pump)
pub const PUMP_STATUS: &[(u16, &str)] = &[
    (0, "Nicht verbaut"),
    (1, "Aus"),
    (2, "An"),
    (3, "Fehler"),
];

/// Doorbell status
pub const DOORBELL_STATUS: &[(u16, &str)] = &[
    (0, "Nicht verbaut"),
    (1, "Aus"),
    (2, "An"),
    (3, "Fehler"),
];

/// Mixer status (heat circuits and buffer charge/switch mixer)
pub const MIXER_STATUS: &[(u16, &str)] = &[
    (0, "Nicht verbaut"),
    (1, "Aus"),
    (2, "Normierung"),
    (3, "Öffen - Langsam"),
    (4, "Öffnen - Schnell"),
    (5, "Schließen - Langsam"),
    (6, "Schließen - Schnell"),
    (7, "Fehler"),
];

/// Valve status (buffer charge valve, boiler switch valve, circulation valves)
pub const VALVE_STATUS: &[(u16, &str)] = &[
    (0, "Nicht verbaut"),
    (1, "Entnormiert"),
    (2, "Offen"),
    (3, "Öffnen"),
    (4, "Geschlossen"),
    (5, "Schließen"),
    (6, "Fehler"),
];

/// Buffer storage overall status
pub const BUFFER_STORAGE_STATUS: &[(u16, &str)] = &[
    (0, "Nicht verbaut"),
    (1, "OK"),
    (2, "Kodierfehler"),
    (3, "Temperatursensorfehler"),
    (4, "Externer Fehler"),
];

/// Which buffer storage is active
pub const BUFFER_ACTIVE_STATUS: &[(u16, &str)] = &[
    (0, "Nicht verfügbar"),
    (1, "Pufferspeicher 1"),
    (2, "Pufferspeicher 2"),
    (3, "Beide parallel"),
];

/// Buffer storage charge status
pub const BUFFER_CHARGE_STATUS: &[(u16, &str)] = &[
    (0, "Nicht verfügbar"),
    (1, "Nicht aktiv"),
    (2, "Aktiv"),
    (3, "Überladen aktiv"),
    (4, "Vollständig überladen"),
    (5, "Angefordert"),
    (6, "Nachlauf"),
    (7, "Fehler Temperatursensor"),
    (8, "Fehler Extern"),
    (9, "Fehler Kodierung"),
];

/// Warm water boiler status
pub const BOILER_STATUS: &[(u16, &str)] = &[
    (0, "Nicht verfügbar"),
    (1, "Aus"),
    (2, "manuelles laden"),
    (3, "automatisches laden"),
    (4, "laden wird beendet"),
    (5, "Fehler: Ladevorgang Zeitüberschreitung"),
    (6, "Fehler"),
];

/// Burner status (wood and gas burner)
pub const BURNER_STATUS: &[(u16, &str)] = &[
    (0, "Nicht verfügbar"),
    (1, "Aus"),
    (2, "Pumpe aktiv"),
    (3, "Brand Startphase"),
    (4, "Brand Startphase fehlgeschlagen"),
    (5, "Brennt"),
    (6, "Brennvorgang beendet"),
    (7, "Fehler - Stromversorgung unterbrochen"),
    (8, "Fehler"),
];

/// Warm water circulation circuit status
pub const CIRCULATION_CIRCUIT_STATUS: &[(u16, &str)] = &[
    (0, "Nicht verbaut"),
    (1, "Aus"),
    (2, "An"),
    (3, "Fehler Kodierung"),
    (4, "Fehler Temperatursensor"),
    (5, "Fehler Pumpe oder Ventil"),
    (6, "Fehler Extern"),
    (7, "Fehler Pufferspeicher unter Mindesttemperatur"),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_unique_codes(table: &[(u16, &str)]) {
        let mut codes: Vec<u16> = table.iter().map(|(c, _)| *c).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), table.len(), "duplicate code in {:?}", table);
    }

    #[test]
    fn test_tables_have_unique_codes() {
        for table in [
            HEAT_CIRCUIT_STATUS,
            PUMP_STATUS,
            DOORBELL_STATUS,
            MIXER_STATUS,
            VALVE_STATUS,
            BUFFER_STORAGE_STATUS,
            BUFFER_ACTIVE_STATUS,
            BUFFER_CHARGE_STATUS,
            BOILER_STATUS,
            BURNER_STATUS,
            CIRCULATION_CIRCUIT_STATUS,
        ] {
            assert_unique_codes(table);
        }
    }

    #[test]
    fn test_mixer_fast_open_is_code_four() {
        assert_eq!(
            MIXER_STATUS.iter().find(|(c, _)| *c == 4).map(|(_, l)| *l),
            Some("Öffnen - Schnell")
        );
    }
}
