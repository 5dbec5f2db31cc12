use serde::{Deserialize, Serialize};

/// Name shown in a slot when there are not enough distinct characters to fill it.
pub const PLACEHOLDER_NAME: &str = "?";

pub const DEFAULT_ROSTER: [&str; 40] = [
    "Adam Warlock",
    "Black Panther",
    "Black Widow",
    "Captain America",
    "Cloak & Dagger",
    "Doctor Strange",
    "Emma Frost",
    "Groot",
    "Hawkeye",
    "Hela",
    "Hulk",
    "Human Torch",
    "Invisible Woman",
    "Iron Fist",
    "Iron Man",
    "Jeff the Land Shark",
    "Loki",
    "Luna Snow",
    "Magik",
    "Magneto",
    "Mantis",
    "Mister Fantastic",
    "Moon Knight",
    "Namor",
    "Peni Parker",
    "Phoenix",
    "Psylocke",
    "The Punisher",
    "The Thing",
    "Rocket Raccoon",
    "Scarlet Witch",
    "Squirrel Girl",
    "Spider-Man",
    "Star-Lord",
    "Storm",
    "Thor",
    "Ultron",
    "Venom",
    "Winter Soldier",
    "Wolverine",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Character {
    pub name: String,
}

impl Character {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn placeholder() -> Self {
        Self::new(PLACEHOLDER_NAME)
    }

}

/// The fixed, alphabetically ordered set of selectable characters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Roster {
    characters: Vec<Character>,
}

impl Roster {
    /// Builds a roster from names, dropping blanks and duplicates and sorting
    /// case-insensitively.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut characters: Vec<Character> = names
            .into_iter()
            .map(|n| n.into().trim().to_string())
            .filter(|n| !n.is_empty())
            .map(Character::new)
            .collect();
        characters.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.name.cmp(&b.name))
        });
        characters.dedup_by(|a, b| a.name == b.name);
        Self { characters }
    }

    pub fn default_roster() -> Self {
        Self::new(DEFAULT_ROSTER)
    }

    /// Parses a JSON array of names, e.g. the contents of a roster file.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let names: Vec<String> = serde_json::from_str(json)?;
        Ok(Self::new(names))
    }

    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

impl Default for Roster {
    fn default() -> Self {
        Self::default_roster()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_roster_is_sorted_and_unique() {
        let roster = Roster::default_roster();
        assert_eq!(roster.len(), 40);
        let names: Vec<&str> = roster.characters().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names[0], "Adam Warlock");
        assert_eq!(names[39], "Wolverine");
        // "The Punisher" is listed before "Rocket Raccoon" in the source list
        let punisher = names.iter().position(|n| *n == "The Punisher").unwrap();
        let rocket = names.iter().position(|n| *n == "Rocket Raccoon").unwrap();
        assert!(rocket < punisher);
    }

    #[test]
    fn new_drops_blanks_and_duplicates() {
        let roster = Roster::new(["b", "A", " ", "b", "c"]);
        let names: Vec<&str> = roster.characters().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A", "b", "c"]);
    }

    #[test]
    fn from_json_parses_names() {
        let roster = Roster::from_json(r#"["Storm", "Hela"]"#).unwrap();
        assert_eq!(roster.characters()[0].name, "Hela");
        assert!(roster.contains("Storm"));
        assert!(Roster::from_json("{").is_err());
    }
}
