use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{ChoreoError, Result};

/// Body area a move mainly works.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyPart {
    Arms,
    Legs,
    Hips,
    #[serde(rename = "Full Body")]
    FullBody,
}

/// Static description of a dance move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveDefinition {
    pub id: String,
    pub name: String,
    /// 1 (easy) to 3 (hard).
    pub difficulty: u8,
    pub body_part: BodyPart,
    pub default_beats: u32,
    #[serde(default)]
    pub description: String,
}

impl MoveDefinition {
    pub fn new(
        id: &str,
        name: &str,
        difficulty: u8,
        body_part: BodyPart,
        default_beats: u32,
        description: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            difficulty,
            body_part,
            default_beats,
            description: description.to_string(),
        }
    }
}

/// Registry of every move a routine may reference.
#[derive(Debug, Default, Clone)]
pub struct MoveCatalog {
    moves: HashMap<String, MoveDefinition>,
}

impl MoveCatalog {
    pub fn new() -> Self {
        Self {
            moves: HashMap::new(),
        }
    }

    /// The stock catalog shipped with the viewer.
    pub fn builtin() -> Self {
        use BodyPart::*;

        let mut catalog = Self::new();
        for definition in [
            MoveDefinition::new(
                "step_touch",
                "Step Touch",
                1,
                Legs,
                8,
                "Step to the side and touch feet together",
            ),
            MoveDefinition::new(
                "body_roll",
                "Body Roll",
                2,
                FullBody,
                8,
                "Roll your body in a wave motion from chest to hips",
            ),
            MoveDefinition::new(
                "arm_wave",
                "Arm Wave",
                2,
                Arms,
                8,
                "Create a wave motion from one hand across to the other",
            ),
            MoveDefinition::new(
                "hip_sway",
                "Hip Sway",
                1,
                Hips,
                4,
                "Sway your hips side to side in rhythm",
            ),
            MoveDefinition::new(
                "clap",
                "Clap",
                1,
                Arms,
                4,
                "Clap your hands together on the beat",
            ),
            MoveDefinition::new(
                "turn",
                "Turn",
                2,
                FullBody,
                8,
                "Spin around in a full circle",
            ),
            MoveDefinition::new(
                "jump",
                "Jump",
                2,
                FullBody,
                4,
                "Jump up with energy on the beat",
            ),
            MoveDefinition::new(
                "slide",
                "Slide",
                1,
                Legs,
                4,
                "Slide your feet smoothly to one side",
            ),
            MoveDefinition::new(
                "shoulder_pop",
                "Shoulder Pop",
                1,
                Arms,
                4,
                "Pop your shoulders up and down alternately",
            ),
            MoveDefinition::new(
                "snap",
                "Snap",
                1,
                Arms,
                4,
                "Snap your fingers to the beat",
            ),
            MoveDefinition::new(
                "point",
                "Point",
                1,
                Arms,
                4,
                "Point in different directions with style",
            ),
            MoveDefinition::new(
                "stomp",
                "Stomp",
                1,
                Legs,
                4,
                "Stomp your feet powerfully on the beat",
            ),
            MoveDefinition::new(
                "groove",
                "Groove",
                1,
                FullBody,
                8,
                "Feel the beat and move your whole body freely",
            ),
            MoveDefinition::new(
                "sway",
                "Sway",
                1,
                FullBody,
                8,
                "Gently sway your body side to side",
            ),
            MoveDefinition::new(
                "punch",
                "Punch",
                2,
                Arms,
                4,
                "Punch the air with power",
            ),
            MoveDefinition::new(
                "shimmy",
                "Shimmy",
                2,
                Arms,
                8,
                "Shake your shoulders rapidly back and forth",
            ),
            MoveDefinition::new(
                "twist",
                "Twist",
                1,
                Hips,
                8,
                "Twist your hips and feet like the classic dance",
            ),
        ] {
            catalog.register(definition);
        }
        catalog
    }

    /// Adds or replaces a move definition.
    pub fn register(&mut self, definition: MoveDefinition) {
        self.moves.insert(definition.id.clone(), definition);
    }

    pub fn get(&self, id: &str) -> Option<&MoveDefinition> {
        self.moves.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.moves.contains_key(id)
    }

    /// Like [`MoveCatalog::get`] but treats a missing id as an error.
    pub fn require(&self, id: &str) -> Result<&MoveDefinition> {
        self.get(id)
            .ok_or_else(|| ChoreoError::msg(format!("unknown move `{id}` in catalog")))
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Ids of moves with the given difficulty, sorted.
    pub fn ids_by_difficulty(&self, difficulty: u8) -> Vec<&str> {
        self.sorted_ids(|definition| definition.difficulty == difficulty)
    }

    /// Ids of moves working the given body part, sorted.
    pub fn ids_by_body_part(&self, body_part: BodyPart) -> Vec<&str> {
        self.sorted_ids(|definition| definition.body_part == body_part)
    }

    fn sorted_ids(&self, keep: impl Fn(&MoveDefinition) -> bool) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .moves
            .values()
            .filter(|definition| keep(definition))
            .map(|definition| definition.id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }
}
