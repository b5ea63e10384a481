//! Environmental telemetry: readings, the safe-band predicate and the
//! chained audit digest over a batch's sensor log.
use crate::batch::TimeStamp;
use crate::error::CustodyError;
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct SensorReading {
    #[n(0)]
    pub timestamp: TimeStamp<Utc>,
    #[n(1)]
    pub temperature: i64, // degrees Celsius
    #[n(2)]
    pub humidity: i64, // percent relative humidity
    #[n(3)]
    pub location: String,
}

impl SensorReading {
    pub fn new(temperature: i64, humidity: i64, location: &str) -> Self {
        Self {
            timestamp: TimeStamp::new(),
            temperature,
            humidity,
            location: location.to_owned(),
        }
    }
}

/// Declared-safe band for a product class. A reading outside either range
/// latches the batch's violation flag. Thresholds are configuration, the
/// predicate never hard-codes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeBand {
    pub temperature_min: i64,
    pub temperature_max: i64,
    pub humidity_min: i64,
    pub humidity_max: i64,
}

impl SafeBand {
    pub fn breached(&self, reading: &SensorReading) -> bool {
        reading.temperature < self.temperature_min
            || reading.temperature > self.temperature_max
            || reading.humidity < self.humidity_min
            || reading.humidity > self.humidity_max
    }
}

impl Default for SafeBand {
    // Cold-chain defaults for refrigerated perishables.
    fn default() -> Self {
        Self {
            temperature_min: 0,
            temperature_max: 8,
            humidity_min: 35,
            humidity_max: 75,
        }
    }
}

/// Extend the audit chain: digest of the previous head concatenated with the
/// CBOR encoding of the new reading. The head commits to the whole log, so
/// any edit to an earlier entry is detectable by recomputation.
pub fn chain_digest(prev_head: &str, reading: &SensorReading) -> Result<String, CustodyError> {
    let cbor = minicbor::to_vec(reading)?;

    let mut preimage = Vec::with_capacity(prev_head.len() + cbor.len());
    preimage.extend_from_slice(prev_head.as_bytes());
    preimage.extend_from_slice(&cbor);

    Ok(sha256::digest(&preimage))
}

/// Recompute the audit head for an entire log, starting from the empty head
/// a batch is created with.
pub fn recompute_head(log: &[SensorReading]) -> Result<String, CustodyError> {
    let mut head = String::new();
    for reading in log {
        head = chain_digest(&head, reading)?;
    }
    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_cbor_roundtrip() {
        let original = SensorReading::new(4, 60, "Warehouse1");

        let encoded = minicbor::to_vec(&original).unwrap();
        let decoded: SensorReading = minicbor::decode(&encoded).unwrap();

        assert_eq!(original, decoded);
    }

    #[test]
    fn default_band_flags_out_of_range_readings() {
        let band = SafeBand::default();

        assert!(!band.breached(&SensorReading::new(4, 60, "Warehouse1")));
        assert!(band.breached(&SensorReading::new(25, 60, "Truck2")));
        assert!(band.breached(&SensorReading::new(4, 90, "Truck2")));
        assert!(band.breached(&SensorReading::new(-5, 60, "Freezer")));
    }

    #[test]
    fn audit_chain_detects_tampering() {
        let log = vec![
            SensorReading::new(3, 55, "Dock A"),
            SensorReading::new(5, 58, "Truck 7"),
        ];
        let head = recompute_head(&log).unwrap();

        let mut tampered = log.clone();
        tampered[0].temperature = 2;

        assert_ne!(head, recompute_head(&tampered).unwrap());
    }
}
