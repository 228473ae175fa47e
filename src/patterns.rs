// 🚚 Transfer Patterns - candidate extraction from chat text
// Reglas como datos: cada regla es un descriptor con su propio mapeo de
// roles. El orden de la tabla importa: es el orden de empate en dedup.

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ingest::RawLine;
use crate::normalize::{clean_person_token, normalize_plate, title_case_name};
use crate::temporal::TemporalExtractor;

// ============================================================================
// RULE TABLE
// ============================================================================

/// How a rule's capture groups map onto transfer roles.
///
/// Never positional: "le paso el carro X a Juan" captures (vehicle, to)
/// while "Pedro recibe el carro X" captures (to, vehicle). Each rule
/// declares its own mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleMap {
    /// Group 1 = vehicle, group 2 = receiving driver.
    VehicleThenTo,
    /// Group 1 = receiving driver, group 2 = vehicle.
    ToThenVehicle,
    /// Group 1 = vehicle, group 2 = giving driver, group 3 = receiving driver.
    VehicleFromTo,
    /// Group 1 = giving driver, group 2 = vehicle, group 3 = receiving driver.
    FromVehicleTo,
}

/// One extraction rule: a compiled pattern plus its role mapping and
/// the confidence it starts from before keyword reinforcement.
pub struct TransferRule {
    pub id: &'static str,
    pub matcher: Regex,
    pub base_confidence: f64,
    pub roles: RoleMap,
}

/// A possible custody transfer, straight out of one chat line.
/// Vehicle and receiving-driver tokens are guaranteed non-empty;
/// everything else is best effort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferCandidate {
    pub vehicle_token: String,
    pub from_driver_token: Option<String>,
    pub to_driver_token: String,
    pub timestamp: Option<NaiveDateTime>,
    pub confidence: f64,
    pub pattern_id: String,
    pub original_text: String,
    pub line_number: usize,
}

/// Verbs that reinforce a match when they appear inside the matched
/// span: +0.05 per distinct keyword, capped at 1.0.
const REINFORCING_KEYWORDS: &[&str] = &[
    "traspaso",
    "traspasa",
    "entrego",
    "entrega",
    "entregué",
    "recibe",
    "recibo",
    "recibió",
    "paso",
    "pasa",
    "pasé",
    "queda",
    "asigna",
    "asigno",
];

/// The built-in rule table, ordered from most to least specific.
pub fn default_rules() -> Vec<TransferRule> {
    let vehicle = r"([A-Za-z0-9][A-Za-z0-9-]*)";
    let name = r"([A-Za-zÁÉÍÓÚÑÜáéíóúñü]+(?:\s+[A-Za-zÁÉÍÓÚÑÜáéíóúñü]+){0,3})";
    let unit = r"(?:(?:el|la|del|de\s+la)\s+)?(?:(?:carro|camioneta|camion|camión|unidad|vehiculo|vehículo|troca|van|moto)\s+)?";

    vec![
        // "traspaso del carro XYZ-987 de Maria Lopez a Luis Hernandez"
        TransferRule {
            id: "traspaso_de_a",
            matcher: Regex::new(&format!(
                r"(?i)traspaso\s+(?:de\s+)?{unit}{vehicle}\s+de\s+{name}\s+a\s+{name}"
            ))
            .unwrap(),
            base_confidence: 0.95,
            roles: RoleMap::VehicleFromTo,
        },
        // "Juan le entrega el carro ABC-123 a Pedro"
        TransferRule {
            id: "entrega_de_a",
            matcher: Regex::new(&format!(
                r"(?i){name}\s+le\s+entrega\s+{unit}{vehicle}\s+a\s+{name}"
            ))
            .unwrap(),
            base_confidence: 0.9,
            roles: RoleMap::FromVehicleTo,
        },
        // "entrego el carro ABC-123 a Juan"
        TransferRule {
            id: "entrega_a",
            matcher: Regex::new(&format!(
                r"(?i)entreg(?:o|a|ué|ue)\s+{unit}{vehicle}\s+a\s+{name}"
            ))
            .unwrap(),
            base_confidence: 0.85,
            roles: RoleMap::VehicleThenTo,
        },
        // "le paso el carro ABC-123 a Juan Perez"
        TransferRule {
            id: "paso_a",
            matcher: Regex::new(&format!(
                r"(?i)(?:le\s+)?pas(?:o|a|é|e)\s+{unit}{vehicle}\s+a\s+{name}"
            ))
            .unwrap(),
            base_confidence: 0.85,
            roles: RoleMap::VehicleThenTo,
        },
        // "Pedro recibe el carro DEF-789"
        TransferRule {
            id: "recibe",
            matcher: Regex::new(&format!(r"(?i){name}\s+recib(?:e|ió|io)\s+{unit}{vehicle}"))
                .unwrap(),
            base_confidence: 0.85,
            roles: RoleMap::ToThenVehicle,
        },
        // "la camioneta JKL-321 queda con Ana Torres"
        TransferRule {
            id: "queda_con",
            matcher: Regex::new(&format!(r"(?i){unit}{vehicle}\s+queda\s+con\s+{name}"))
                .unwrap(),
            base_confidence: 0.8,
            roles: RoleMap::VehicleThenTo,
        },
    ]
}

// ============================================================================
// EXTRACTOR
// ============================================================================

pub struct PatternExtractor {
    rules: Vec<TransferRule>,
    temporal: TemporalExtractor,
}

impl PatternExtractor {
    pub fn new() -> Self {
        Self::from_rules(default_rules())
    }

    /// Extractor with a caller-supplied rule table.
    pub fn from_rules(rules: Vec<TransferRule>) -> Self {
        PatternExtractor {
            rules,
            temporal: TemporalExtractor::new(),
        }
    }

    /// Run every rule over every line. One line may emit several
    /// overlapping candidates; collapsing them is the deduplicator's job.
    pub fn extract(&self, lines: &[RawLine]) -> Vec<TransferCandidate> {
        let mut candidates = Vec::new();

        for line in lines {
            let timestamp = self.temporal.extract(&line.text);
            for rule in &self.rules {
                if let Some(candidate) = apply_rule(rule, line, timestamp) {
                    candidates.push(candidate);
                }
            }
        }

        candidates
    }
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_rule(
    rule: &TransferRule,
    line: &RawLine,
    timestamp: Option<NaiveDateTime>,
) -> Option<TransferCandidate> {
    let caps = rule.matcher.captures(&line.text)?;
    let group = |idx: usize| caps.get(idx).map(|m| m.as_str()).unwrap_or("");

    let (vehicle_raw, from_raw, to_raw) = match rule.roles {
        RoleMap::VehicleThenTo => (group(1), "", group(2)),
        RoleMap::ToThenVehicle => (group(2), "", group(1)),
        RoleMap::VehicleFromTo => (group(1), group(2), group(3)),
        RoleMap::FromVehicleTo => (group(2), group(1), group(3)),
    };

    let vehicle_token = normalize_plate(vehicle_raw);
    let to_driver_token = title_case_name(&clean_person_token(to_raw));
    if vehicle_token.is_empty() || to_driver_token.is_empty() {
        return None;
    }

    let from_driver_token = {
        let cleaned = title_case_name(&clean_person_token(from_raw));
        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned)
        }
    };

    let confidence = score_confidence(rule.base_confidence, group(0));

    Some(TransferCandidate {
        vehicle_token,
        from_driver_token,
        to_driver_token,
        timestamp,
        confidence,
        pattern_id: rule.id.to_string(),
        original_text: line.text.clone(),
        line_number: line.line_number,
    })
}

fn score_confidence(base: f64, matched_span: &str) -> f64 {
    let span_lower = matched_span.to_lowercase();
    let hits = REINFORCING_KEYWORDS
        .iter()
        .filter(|kw| {
            span_lower
                .split(|c: char| !c.is_alphabetic())
                .any(|word| word == **kw)
        })
        .count();

    (base + hits as f64 * 0.05).min(1.0)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn line(text: &str) -> RawLine {
        RawLine {
            text: text.to_string(),
            line_number: 1,
            source_label: "test".to_string(),
        }
    }

    #[test]
    fn test_paso_rule_extracts_single_candidate() {
        let extractor = PatternExtractor::new();
        let candidates = extractor.extract(&[line("le paso el carro ABC-123 a Juan Perez")]);

        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.vehicle_token, "ABC-123");
        assert_eq!(c.to_driver_token, "Juan Perez");
        assert_eq!(c.from_driver_token, None);
        assert_eq!(c.pattern_id, "paso_a");
        assert!(c.confidence >= 0.9);
    }

    #[test]
    fn test_recibe_rule_maps_roles_correctly() {
        let extractor = PatternExtractor::new();
        let candidates = extractor.extract(&[line("Pedro recibe el carro DEF-789")]);

        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.to_driver_token, "Pedro");
        assert_eq!(c.vehicle_token, "DEF-789");
        assert_eq!(c.pattern_id, "recibe");
    }

    #[test]
    fn test_traspaso_rule_captures_all_three_roles() {
        let extractor = PatternExtractor::new();
        let candidates = extractor.extract(&[line(
            "traspaso del carro XYZ-987 de Maria Lopez a Luis Hernandez",
        )]);

        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.pattern_id, "traspaso_de_a");
        assert_eq!(c.vehicle_token, "XYZ-987");
        assert_eq!(c.from_driver_token, Some("Maria Lopez".to_string()));
        assert_eq!(c.to_driver_token, "Luis Hernandez");
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn test_entrega_rules_may_overlap() {
        let extractor = PatternExtractor::new();
        let candidates =
            extractor.extract(&[line("Juan le entrega el carro ABC-123 a Pedro")]);

        // Both entrega rules fire; dedup keeps the first (most specific).
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].pattern_id, "entrega_de_a");
        assert_eq!(candidates[0].from_driver_token, Some("Juan".to_string()));
        assert_eq!(candidates[1].pattern_id, "entrega_a");
        for c in &candidates {
            assert_eq!(c.vehicle_token, "ABC-123");
            assert_eq!(c.to_driver_token, "Pedro");
        }
    }

    #[test]
    fn test_queda_con_rule() {
        let extractor = PatternExtractor::new();
        let candidates = extractor.extract(&[line("la camioneta JKL-321 queda con Ana Torres")]);

        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.pattern_id, "queda_con");
        assert_eq!(c.vehicle_token, "JKL-321");
        assert_eq!(c.to_driver_token, "Ana Torres");
    }

    #[test]
    fn test_timestamp_attached_to_candidates() {
        let extractor = PatternExtractor::new();
        let candidates = extractor.extract(&[line(
            "15/03/2024 10:30 - Maria: le paso el carro ABC-123 a Juan",
        )]);

        assert_eq!(candidates.len(), 1);
        assert_eq!(
            candidates[0].timestamp,
            Some(
                NaiveDate::from_ymd_opt(2024, 3, 15)
                    .unwrap()
                    .and_hms_opt(10, 30, 0)
                    .unwrap()
            )
        );
    }

    #[test]
    fn test_non_transfer_line_yields_nothing() {
        let extractor = PatternExtractor::new();
        let candidates = extractor.extract(&[line("hoy no hay movimientos en el patio")]);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_confidence_never_exceeds_one() {
        let extractor = PatternExtractor::new();
        let candidates = extractor.extract(&[line(
            "traspaso del carro ABC-123 de Juan a Pedro, Pedro recibe y queda con el carro",
        )]);

        assert!(!candidates.is_empty());
        for c in &candidates {
            assert!(c.confidence <= 1.0);
        }
    }
}
