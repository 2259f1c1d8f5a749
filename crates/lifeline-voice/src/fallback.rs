//! Offline fallback responder: deterministic keyword routing into a fixed
//! table of canned guidance. Never fails — unmatched input gets the generic
//! seek-help answer, so the coordinator always has something to speak.

use crate::response::{EmergencyCategory, GuidanceResponse, RequiredAction};
use tracing::debug;

const DEFAULT_EMERGENCY_NUMBER: &str = "911";

/// Keyword-driven guidance generator used whenever the cloud responder is
/// unavailable, fails, or is disabled by preference.
#[derive(Debug, Clone)]
pub struct FallbackResponder {
    emergency_number: String,
}

impl Default for FallbackResponder {
    fn default() -> Self {
        Self::new(DEFAULT_EMERGENCY_NUMBER)
    }
}

impl FallbackResponder {
    pub fn new(emergency_number: impl Into<String>) -> Self {
        Self {
            emergency_number: emergency_number.into(),
        }
    }

    /// Classify free text and answer from the table. Synchronous and total.
    pub fn respond(&self, text: &str) -> GuidanceResponse {
        match Self::classify(text) {
            Some(category) => {
                debug!(category = category.as_str(), "fallback matched category");
                self.respond_category(category)
            }
            None => self.generic_response(),
        }
    }

    /// Canned guidance for a known category (shortcut path).
    pub fn respond_category(&self, category: EmergencyCategory) -> GuidanceResponse {
        let (text, urgency, call) = self.guidance_for(category);
        let mut response = GuidanceResponse::new(text)
            .with_attribute("source", "offline")
            .with_attribute("urgency", urgency)
            .with_attribute("category", category.as_str());
        if call {
            response = response.with_action(RequiredAction::CallEmergencyNumber(
                self.emergency_number.clone(),
            ));
        }
        response
    }

    /// Match the first category whose keyword list hits the lowercased text.
    pub fn classify(text: &str) -> Option<EmergencyCategory> {
        let lowered = text.to_lowercase();
        EmergencyCategory::ALL.into_iter().find(|category| {
            keywords_for(*category)
                .iter()
                .any(|keyword| lowered.contains(keyword))
        })
    }

    fn generic_response(&self) -> GuidanceResponse {
        GuidanceResponse::new(
            "Stay calm and keep the person still and comfortable. If the situation is \
             life-threatening or you are unsure, call emergency services now and follow \
             the dispatcher's instructions. Seek professional medical help.",
        )
        .with_attribute("source", "offline")
        .with_attribute("urgency", "unknown")
        .with_action(RequiredAction::CallEmergencyNumber(
            self.emergency_number.clone(),
        ))
    }

    fn guidance_for(&self, category: EmergencyCategory) -> (&'static str, &'static str, bool) {
        use EmergencyCategory::*;
        match category {
            CardiacArrest => (
                "Call emergency services now. Place the person on their back on a firm \
                 surface. Start chest compressions in the center of the chest at 100 to 120 \
                 per minute, pressing about 5 centimeters deep. Do not stop until help \
                 arrives or the person starts breathing. If an AED is available, turn it on \
                 and follow its voice prompts.",
                "critical",
                true,
            ),
            AirwayObstruction => (
                "If the person can cough, encourage them to keep coughing. If they cannot \
                 breathe, give 5 firm back blows between the shoulder blades, then 5 \
                 abdominal thrusts just above the navel. Alternate until the object is out. \
                 If they become unresponsive, call emergency services and start CPR.",
                "critical",
                true,
            ),
            Hemorrhage => (
                "Apply firm, direct pressure on the wound with a clean cloth and do not \
                 release it. If blood soaks through, add more cloth on top without lifting \
                 the first layer. Keep the injured part raised if possible. For limb wounds \
                 that will not stop bleeding, apply a tourniquet above the wound and note \
                 the time.",
                "critical",
                true,
            ),
            Burn => (
                "Cool the burn under cool running water for at least 20 minutes. Remove \
                 rings and tight clothing near the burn before it swells. Do not apply ice, \
                 butter, or creams. Cover loosely with a clean non-stick dressing. Seek \
                 medical care for burns larger than the person's palm, or on the face, \
                 hands, or joints.",
                "high",
                false,
            ),
            Stroke => (
                "Use the FAST check: Face drooping, Arm weakness, Speech difficulty — Time \
                 to call emergency services immediately. Note the time symptoms started. \
                 Keep the person resting, do not give food, drink, or medicine, and stay \
                 with them until help arrives.",
                "critical",
                true,
            ),
            Seizure => (
                "Protect the person from injury: clear hard objects away and cushion their \
                 head. Do not restrain them and never put anything in their mouth. When \
                 jerking stops, roll them onto their side. Call emergency services if the \
                 seizure lasts over 5 minutes, repeats, or the person does not wake up.",
                "high",
                false,
            ),
            Anaphylaxis => (
                "If the person has an epinephrine auto-injector, help them use it on the \
                 outer thigh immediately. Call emergency services. Have them lie flat with \
                 legs raised unless breathing is easier sitting up. A second dose may be \
                 given after 5 minutes if symptoms do not improve.",
                "critical",
                true,
            ),
            Poisoning => (
                "Do not make the person vomit. If they are alert, find out what was taken, \
                 how much, and when. Call poison control or emergency services with that \
                 information. If they are drowsy or unresponsive, place them on their side \
                 and monitor breathing.",
                "high",
                true,
            ),
            Fracture => (
                "Keep the injured limb still; do not try to straighten it. Immobilize it in \
                 the position found, padding around the injury. Apply a cold pack wrapped in \
                 cloth to limit swelling. If the bone pierces the skin or the limb is cold \
                 or blue below the injury, call emergency services.",
                "moderate",
                false,
            ),
            Hypothermia => (
                "Move the person somewhere warm and remove wet clothing. Warm them \
                 gradually with blankets, covering the head and neck. Give warm sweet \
                 drinks only if fully awake. Do not rub the skin or apply direct heat. If \
                 they are confused or drowsy, call emergency services.",
                "high",
                true,
            ),
            HeatStroke => (
                "Move the person to shade or a cool room and call emergency services. Cool \
                 them aggressively: soak clothing with cool water, fan them, and place cold \
                 packs at the neck, armpits, and groin. Give small sips of water only if \
                 fully alert.",
                "critical",
                true,
            ),
        }
    }
}

fn keywords_for(category: EmergencyCategory) -> &'static [&'static str] {
    use EmergencyCategory::*;
    match category {
        CardiacArrest => &[
            "cardiac",
            "heart attack",
            "not breathing",
            "no pulse",
            "collapsed",
            "cpr",
        ],
        AirwayObstruction => &["chok", "airway", "can't breathe", "cannot breathe", "swallowed something stuck"],
        Hemorrhage => &["bleed", "hemorrhage", "blood loss", "deep cut", "wound"],
        Burn => &["burn", "scald"],
        Stroke => &["stroke", "face droop", "slurred speech", "one side weak"],
        Seizure => &["seizure", "convuls", "epilep", "fitting"],
        Anaphylaxis => &[
            "anaphyla",
            "allergic reaction",
            "epipen",
            "swelling throat",
            "hives",
        ],
        Poisoning => &["poison", "overdose", "swallowed chemical", "ingested"],
        Fracture => &["fracture", "broken bone", "broken arm", "broken leg", "dislocat"],
        Hypothermia => &["hypothermia", "freezing", "frostbite", "dangerously cold"],
        HeatStroke => &["heat stroke", "heatstroke", "overheated", "heat exhaustion"],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cardiac_guidance_includes_compression_rate() {
        let fallback = FallbackResponder::default();
        let response = fallback.respond_category(EmergencyCategory::CardiacArrest);
        assert!(response.text.contains("100 to 120"));
        assert_eq!(response.source(), Some("offline"));
        assert!(matches!(
            response.required_action,
            Some(RequiredAction::CallEmergencyNumber(ref n)) if n == "911"
        ));
    }

    #[test]
    fn keyword_routing_matches_expected_categories() {
        assert_eq!(
            FallbackResponder::classify("my dad collapsed and has no pulse"),
            Some(EmergencyCategory::CardiacArrest)
        );
        assert_eq!(
            FallbackResponder::classify("she is CHOKING on food"),
            Some(EmergencyCategory::AirwayObstruction)
        );
        assert_eq!(
            FallbackResponder::classify("deep cut, it won't stop bleeding"),
            Some(EmergencyCategory::Hemorrhage)
        );
        assert_eq!(
            FallbackResponder::classify("spilled boiling water, bad scald"),
            Some(EmergencyCategory::Burn)
        );
        assert_eq!(FallbackResponder::classify("lovely weather today"), None);
    }

    #[test]
    fn unmatched_text_gets_generic_guidance() {
        let fallback = FallbackResponder::default();
        let response = fallback.respond("something feels wrong");
        assert!(response.text.contains("professional"));
        assert_eq!(response.source(), Some("offline"));
        assert_eq!(
            response.attributes.get("urgency").map(String::as_str),
            Some("unknown")
        );
    }

    #[test]
    fn every_category_answers_offline() {
        let fallback = FallbackResponder::new("112");
        for category in EmergencyCategory::ALL {
            let response = fallback.respond_category(category);
            assert!(!response.text.is_empty());
            assert!(response.is_offline());
            assert_eq!(
                response.attributes.get("category").map(String::as_str),
                Some(category.as_str())
            );
        }
    }

    #[test]
    fn custom_emergency_number_is_used() {
        let fallback = FallbackResponder::new("112");
        let response = fallback.respond_category(EmergencyCategory::Stroke);
        assert_eq!(
            response.required_action,
            Some(RequiredAction::CallEmergencyNumber("112".to_string()))
        );
    }

    #[test]
    fn synthetic_shortcut_transcripts_route_back_to_their_category() {
        for category in EmergencyCategory::ALL {
            let matched = FallbackResponder::classify(category.synthetic_transcript());
            assert_eq!(matched, Some(category), "category {category} did not round-trip");
        }
    }
}
