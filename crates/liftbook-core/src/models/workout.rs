use serde::{Deserialize, Serialize};

/// One exercise logged in the user's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(deserialize_with = "crate::models::user::string_or_number")]
    pub id: String,
    pub name: String,
    pub group: String,
    pub hour: String,
}

/// History grouped by day, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryDay {
    pub title: String,
    #[serde(default)]
    pub data: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
    #[serde(deserialize_with = "crate::models::user::string_or_number")]
    pub id: String,
    pub name: String,
    pub group: String,
    pub series: Option<u32>,
    pub repetitions: Option<u32>,
    pub demo: Option<String>,
    pub thumb: Option<String>,
}

impl Exercise {
    pub fn display_sets(&self) -> String {
        match (self.series, self.repetitions) {
            (Some(series), Some(reps)) => format!("{} series x {} reps", series, reps),
            (Some(series), None) => format!("{} series", series),
            (None, Some(reps)) => format!("{} reps", reps),
            (None, None) => "Unknown".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_history_response() {
        let json = r#"[{"title": "26.08.22", "data": [{"id": 12, "name": "Puxada frontal", "group": "costas", "hour": "08:37", "created_at": "2022-08-26 08:37:12"}]}]"#;
        let days: Vec<HistoryDay> = serde_json::from_str(json).expect("Failed to parse history test JSON");
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].data[0].id, "12");
        assert_eq!(days[0].data[0].group, "costas");
    }

    #[test]
    fn test_exercise_display_sets() {
        let mut exercise = Exercise {
            id: "1".to_string(),
            name: "Remada".to_string(),
            group: "costas".to_string(),
            series: Some(3),
            repetitions: Some(12),
            demo: None,
            thumb: None,
        };
        assert_eq!(exercise.display_sets(), "3 series x 12 reps");
        exercise.repetitions = None;
        assert_eq!(exercise.display_sets(), "3 series");
        exercise.series = None;
        assert_eq!(exercise.display_sets(), "Unknown");
    }
}
