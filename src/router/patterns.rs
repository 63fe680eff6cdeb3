//! Ordered command pattern table
//!
//! First matching rule wins. Stop rules sit at the top of the table so a halt
//! request can never be shadowed by a movement rule; multi-word rules come
//! before the single-word rules they overlap with.

use std::sync::LazyLock;

use regex::Regex;

use super::numbers;
use super::{Action, ActionKind, ParamValue};

/// Turn verbs shared by the directional and generic turn rules
const TURN_VERBS: &str = "gira|girar|tuerce|rota|dobla|voltea|da la vuelta|date la vuelta|\
     media vuelta|cuarto de vuelta|vuelta completa|una vuelta|giro completo";

/// Which quantity to pull out of a matched fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extract {
    None,
    Distance,
    Angle,
    /// Angle, with full/half/quarter turn phrases checked first
    TurnAngle,
}

#[derive(Debug, Clone, Copy)]
enum DefaultParam {
    Number(f64),
    Text(&'static str),
}

/// One row of the table: matcher, action kind and default parameters
#[derive(Debug)]
pub(crate) struct Rule {
    matcher: Regex,
    exclude: Option<Regex>,
    kind: ActionKind,
    defaults: &'static [(&'static str, DefaultParam)],
    extract: Extract,
    confirmation: &'static str,
}

impl Rule {
    fn new(
        pattern: &str,
        kind: ActionKind,
        defaults: &'static [(&'static str, DefaultParam)],
        extract: Extract,
        confirmation: &'static str,
    ) -> Self {
        Self {
            matcher: Regex::new(&format!("(?i){pattern}")).expect("valid regex"),
            exclude: None,
            kind,
            defaults,
            extract,
            confirmation,
        }
    }

    /// Reject fragments that also match `pattern`
    fn excluding(mut self, pattern: &str) -> Self {
        self.exclude = Some(Regex::new(&format!("(?i){pattern}")).expect("valid regex"));
        self
    }

    fn matches(&self, text: &str) -> bool {
        self.matcher.is_match(text) && !self.exclude.as_ref().is_some_and(|ex| ex.is_match(text))
    }

    fn build(&self, text: &str) -> Action {
        let mut action = Action::new(self.kind);
        for (key, value) in self.defaults {
            let value = match value {
                DefaultParam::Number(n) => ParamValue::Number(*n),
                DefaultParam::Text(t) => ParamValue::Text((*t).to_string()),
            };
            action.params.insert((*key).to_string(), value);
        }

        let quantity = match self.extract {
            Extract::None => None,
            Extract::Distance => numbers::distance(text).map(|d| ("distance", d)),
            Extract::Angle => numbers::angle(text).map(|a| ("angle", a)),
            Extract::TurnAngle => numbers::special_turn(text)
                .or_else(|| numbers::angle(text))
                .map(|a| ("angle", a)),
        };
        if let Some((key, value)) = quantity {
            action.params.insert(key.to_string(), ParamValue::Number(value));
        }

        action
    }
}

const NONE: &[(&str, DefaultParam)] = &[];
const FORWARD: &[(&str, DefaultParam)] = &[
    ("direction", DefaultParam::Text("forward")),
    ("distance", DefaultParam::Number(1.0)),
];
const BACKWARD: &[(&str, DefaultParam)] = &[
    ("direction", DefaultParam::Text("backward")),
    ("distance", DefaultParam::Number(1.0)),
];
const LEFT: &[(&str, DefaultParam)] = &[
    ("direction", DefaultParam::Text("left")),
    ("angle", DefaultParam::Number(90.0)),
];
const RIGHT: &[(&str, DefaultParam)] = &[
    ("direction", DefaultParam::Text("right")),
    ("angle", DefaultParam::Number(90.0)),
];
const LOOK: &[(&str, DefaultParam)] = &[("angle", DefaultParam::Number(30.0))];

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        // Stop
        Rule::new(
            r"\b(?:para|stop|det[eé]nte|quieto|frena|basta|alto|no te muevas)\b",
            ActionKind::Stop,
            NONE,
            Extract::None,
            "Detenido",
        )
        .excluding(r"\bpara\s+(?:a?delante|atr[aá]s)\b"),
        // Look
        Rule::new(
            r"\b(?:mira\b.*\barriba|levanta\b.*\bcabeza|sube\b.*\bcabeza)\b",
            ActionKind::LookUp,
            LOOK,
            Extract::Angle,
            "Mirando arriba",
        ),
        Rule::new(
            r"\b(?:mira\b.*\babajo|baja\b.*\bcabeza)\b",
            ActionKind::LookDown,
            LOOK,
            Extract::Angle,
            "Mirando abajo",
        ),
        // Sleep / wake
        Rule::new(
            r"\b(?:duerme|du[eé]rmete|a dormir|descansa|reposo|modo reposo|rel[aá]jate)\b",
            ActionKind::Sleep,
            NONE,
            Extract::None,
            "Entrando en reposo",
        ),
        Rule::new(
            r"\b(?:despierta|arriba|act[ií]vate|espabila|levanta|vamos)\b",
            ActionKind::Wake,
            NONE,
            Extract::None,
            "Despertando",
        ),
        // Dance
        Rule::new(
            r"\b(?:baila|bailar|men[eé]ate|mueve el esqueleto)\b",
            ActionKind::Dance,
            NONE,
            Extract::None,
            "¡A bailar!",
        ),
        // Movement; backward first so "ve hacia atrás" is not read as forward
        Rule::new(
            r"\b(?:retrocede|atr[aá]s|hacia atr[aá]s|marcha atr[aá]s|pa'?tr[aá]s|recula|recular)\b",
            ActionKind::Move,
            BACKWARD,
            Extract::Distance,
            "Retrocediendo",
        ),
        Rule::new(
            r"\b(?:avanza|adelante|delante|hacia adelante|camina|mu[eé]vete|ve|anda|sigue|pa'?lante)\b",
            ActionKind::Move,
            FORWARD,
            Extract::Distance,
            "Avanzando",
        ),
        // Turn
        Rule::new(
            &format!(r"\b(?:{TURN_VERBS})\b.*\bizquierda\b"),
            ActionKind::Turn,
            LEFT,
            Extract::TurnAngle,
            "Girando a la izquierda",
        ),
        Rule::new(
            r"\bizquierda\b",
            ActionKind::Turn,
            LEFT,
            Extract::TurnAngle,
            "Girando a la izquierda",
        ),
        Rule::new(
            &format!(r"\b(?:{TURN_VERBS})\b.*\bderecha\b"),
            ActionKind::Turn,
            RIGHT,
            Extract::TurnAngle,
            "Girando a la derecha",
        ),
        Rule::new(
            r"\bderecha\b",
            ActionKind::Turn,
            RIGHT,
            Extract::TurnAngle,
            "Girando a la derecha",
        ),
        Rule::new(
            &format!(r"\b(?:{TURN_VERBS})\b"),
            ActionKind::Turn,
            RIGHT,
            Extract::TurnAngle,
            "Girando",
        ),
        // Grab / release
        Rule::new(
            r"\b(?:agarra|coge|sujeta|toma)\b",
            ActionKind::Grab,
            NONE,
            Extract::None,
            "Agarrando",
        ),
        Rule::new(
            r"\b(?:suelta|libera|deja|soltar)\b",
            ActionKind::Release,
            NONE,
            Extract::None,
            "Soltando",
        ),
    ]
});

/// Resolve one command fragment against the table
///
/// Returns the action and the rule's confirmation phrase.
pub(crate) fn resolve(fragment: &str) -> Option<(Action, &'static str)> {
    let rule = RULES.iter().find(|rule| rule.matches(fragment))?;
    tracing::trace!(fragment, kind = rule.kind.as_str(), "pattern matched");
    Some((rule.build(fragment), rule.confirmation))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_is_first_rule() {
        assert_eq!(RULES[0].kind, ActionKind::Stop);
    }

    #[test]
    fn test_stop_shadows_movement() {
        let (action, _) = resolve("avanza no te muevas").unwrap();
        assert_eq!(action.kind, ActionKind::Stop);
    }

    #[test]
    fn test_para_adelante_is_not_stop() {
        let (action, _) = resolve("anda para adelante").unwrap();
        assert_eq!(action.kind, ActionKind::Move);
    }

    #[test]
    fn test_look_up_before_wake() {
        let (action, confirmation) = resolve("mira hacia arriba").unwrap();
        assert_eq!(action.kind, ActionKind::LookUp);
        assert_eq!(action.number("angle"), Some(30.0));
        assert_eq!(confirmation, "Mirando arriba");

        let (action, _) = resolve("levanta la cabeza").unwrap();
        assert_eq!(action.kind, ActionKind::LookUp);
    }

    #[test]
    fn test_look_down_angle() {
        let (action, _) = resolve("baja la cabeza 20 grados").unwrap();
        assert_eq!(action.kind, ActionKind::LookDown);
        assert_eq!(action.number("angle"), Some(20.0));
    }

    #[test]
    fn test_grab_and_release() {
        assert_eq!(resolve("agarra la pelota").unwrap().0.kind, ActionKind::Grab);
        assert_eq!(resolve("suelta").unwrap().0.kind, ActionKind::Release);
    }

    #[test]
    fn test_no_rule() {
        assert!(resolve("qué hora es").is_none());
        assert!(resolve("").is_none());
    }
}
