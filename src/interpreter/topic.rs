use super::heuristics::looks_like_topic_identifier;

/// A topic split into its `/`-separated segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicInfo<'a> {
    pub parts: Vec<&'a str>,
    pub root: &'a str,
    pub leaf: &'a str,
    pub second_last: Option<&'a str>,
}

impl<'a> TopicInfo<'a> {
    pub fn parse(topic: &'a str) -> Self {
        let parts: Vec<&str> = topic.split('/').collect();
        let root = parts.first().copied().unwrap_or_default();
        let leaf = parts.last().copied().unwrap_or_default();
        let second_last = parts.len().checked_sub(2).map(|i| parts[i]);

        Self {
            parts,
            root,
            leaf,
            second_last,
        }
    }

    pub fn depth(&self) -> usize {
        self.parts.len()
    }

    /// Everything above the leaf, joined back together
    pub fn hierarchy(&self) -> String {
        match self.parts.split_last() {
            Some((_, parents)) => parents.join("/"),
            None => String::new(),
        }
    }

    /// `"{kind}_{id}"` for the first segment that is followed by an identifier-like one
    ///
    /// `cell/1/temperature` yields `cell_1`.
    pub fn typed_instance(&self) -> Option<String> {
        self.parts
            .windows(2)
            .find(|pair| looks_like_topic_identifier(pair[1]))
            .map(|pair| format!("{}_{}", pair[0], pair[1]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_segments() {
        let topic = TopicInfo::parse("plant/line2/pump_a/pressure");
        assert_eq!(topic.depth(), 4);
        assert_eq!(topic.root, "plant");
        assert_eq!(topic.leaf, "pressure");
        assert_eq!(topic.second_last, Some("pump_a"));
        assert_eq!(topic.hierarchy(), "plant/line2/pump_a");
    }

    #[test]
    fn single_segment() {
        let topic = TopicInfo::parse("temperature");
        assert_eq!(topic.depth(), 1);
        assert_eq!(topic.root, "temperature");
        assert_eq!(topic.leaf, "temperature");
        assert_eq!(topic.second_last, None);
        assert_eq!(topic.hierarchy(), "");
        assert_eq!(topic.typed_instance(), None);
    }

    #[test]
    fn typed_instance_uses_first_identifier_pair() {
        assert_eq!(
            TopicInfo::parse("cell/1/temperature").typed_instance(),
            Some("cell_1".to_string())
        );
        assert_eq!(
            TopicInfo::parse("sensors/building1/temperature").typed_instance(),
            Some("sensors_building1".to_string())
        );
        assert_eq!(
            TopicInfo::parse("factory/temperature").typed_instance(),
            None
        );
    }
}
