//! Scores chat messages. A message's cancer is the sum of the points of every symptom it shows.

/// Anything able to turn a chat message into a score.
pub trait Scorer: Send + Sync {
    fn points(&self, message: &str) -> u64;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Symptom {
    /// One point per missing word.
    MinimumWordCount(usize),
    /// One point for the first missing character, then one per 3 missing.
    MinimumMessageLength(usize),
    /// One point for the first character over, then one per 5 over.
    MaximumMessageLength(usize),
    /// One point over the ratio, then one per 0.5 over.
    CapsRatio(f64),
    /// Unique/total word ratio below the threshold: one point, then one per 0.3 under.
    EchoingRatio(f64),
}

impl Symptom {
    pub fn points(&self, message: &str) -> u64 {
        match *self {
            Symptom::MinimumWordCount(count) => {
                count.saturating_sub(message.split_whitespace().count()) as u64
            }

            Symptom::MinimumMessageLength(length) => {
                match length.saturating_sub(message.chars().count()) {
                    0 => 0,
                    missing => 1 + (missing / 3) as u64,
                }
            }

            Symptom::MaximumMessageLength(length) => {
                match message.chars().count().saturating_sub(length) {
                    0 => 0,
                    over => 1 + (over / 5) as u64,
                }
            }

            Symptom::CapsRatio(max) => {
                let len = message.chars().count();
                if len == 0 {
                    return 0;
                }

                let caps = message.chars().filter(|c| c.is_uppercase()).count();
                over_threshold(caps as f64 / len as f64 - max, 0.5)
            }

            Symptom::EchoingRatio(min) => {
                let words: Vec<&str> = message.split_whitespace().collect();

                // a single word isn't echoing itself
                if words.len() < 2 {
                    return 0;
                }

                let unique = words.iter().collect::<std::collections::HashSet<_>>().len();
                over_threshold(min - unique as f64 / words.len() as f64, 0.3)
            }
        }
    }
}

fn over_threshold(over: f64, step: f64) -> u64 {
    if over > 0.0 {
        1 + (over / step) as u64
    } else {
        0
    }
}

#[derive(Debug, Clone)]
pub struct Diagnosis {
    symptoms: Vec<Symptom>,
}

impl Default for Diagnosis {
    fn default() -> Self {
        Self {
            symptoms: vec![
                Symptom::MinimumWordCount(2),
                Symptom::MinimumMessageLength(2),
                Symptom::MaximumMessageLength(80),
                Symptom::CapsRatio(0.2),
                Symptom::EchoingRatio(0.7),
            ],
        }
    }
}

impl Diagnosis {
    /// Symptoms `message` shows.
    pub fn diagnose(&self, message: &str) -> Vec<Symptom> {
        self.symptoms
            .iter()
            .filter(|s| s.points(message) > 0)
            .copied()
            .collect()
    }
}

impl Scorer for Diagnosis {
    fn points(&self, message: &str) -> u64 {
        let points: u64 = self.symptoms.iter().map(|s| s.points(message)).sum();

        if points > 1000 {
            tracing::info!(
                points,
                symptoms = ?self.diagnose(message),
                text = %message,
                "very high score"
            );
        } else if points > 200 {
            tracing::debug!(points, text = %message, "high score");
        }

        points
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_minimum_word_count() {
        let s = Symptom::MinimumWordCount(2);

        assert_eq!(s.points("hello world"), 0);
        assert_eq!(s.points("hello"), 1);
        assert_eq!(s.points(""), 2);
    }

    #[test]
    fn test_message_length() {
        let min = Symptom::MinimumMessageLength(5);
        assert_eq!(min.points("hello"), 0);
        assert_eq!(min.points("hell"), 1);
        assert_eq!(min.points("he"), 2);

        let max = Symptom::MaximumMessageLength(10);
        assert_eq!(max.points("0123456789"), 0);
        assert_eq!(max.points("0123456789a"), 1);
        assert_eq!(max.points("0123456789abcde"), 2);
        assert_eq!(max.points(&"é".repeat(10)), 0);
    }

    #[test]
    fn test_caps_ratio() {
        let s = Symptom::CapsRatio(0.2);

        assert_eq!(s.points("hello world"), 0);
        assert_eq!(s.points("Hello"), 0);
        assert_eq!(s.points("HEllo"), 1);
        assert_eq!(s.points("HELLO"), 2);
        assert_eq!(s.points(""), 0);
    }

    #[test]
    fn test_echoing_ratio() {
        let s = Symptom::EchoingRatio(0.7);

        assert_eq!(s.points("Kappa"), 0);
        assert_eq!(s.points("one two three"), 0);
        assert_eq!(s.points("Kappa Kappa"), 1);
        assert_eq!(s.points("Kappa Kappa Kappa Kappa"), 2);
    }

    #[test]
    fn test_diagnosis_sums_symptoms() {
        let diagnosis = Diagnosis::default();

        assert_eq!(diagnosis.points("this is a perfectly fine message"), 0);
        // one word (1), caps (2), single word isn't echo
        assert_eq!(diagnosis.points("KAPPA"), 3);
        assert_eq!(
            diagnosis.diagnose("KAPPA"),
            vec![Symptom::MinimumWordCount(2), Symptom::CapsRatio(0.2)]
        );
    }
}
