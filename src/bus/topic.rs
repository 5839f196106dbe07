//! Topic and agent identities.

use std::fmt;
use std::str::FromStr;

use super::BusError;

/// Logical channels of the pipeline. Topic types form a closed set so that routing can be
/// resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TopicType {
    /// Run trigger.
    Start,
    /// Extraction branch input.
    Extract,
    /// Extraction branch completion.
    Extracted,
    /// Generation branch input.
    Generate,
    /// Generation branch completion.
    Generated,
    /// Merged run output.
    Results,
}

impl TopicType {
    /// Every topic type, in pipeline order.
    pub const ALL: [TopicType; 6] = [
        Self::Start,
        Self::Extract,
        Self::Extracted,
        Self::Generate,
        Self::Generated,
        Self::Results,
    ];

    /// Wire name of the topic type.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Extract => "extract",
            Self::Extracted => "extracted",
            Self::Generate => "generate",
            Self::Generated => "generated",
            Self::Results => "results",
        }
    }
}

impl fmt::Display for TopicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopicType {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| BusError::UnknownTopicType(s.to_string()))
    }
}

/// Address of a publish: the topic type plus the scope (`source`) it belongs to.
///
/// Two topics are equal iff both fields match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicId {
    /// Channel the message is published on.
    pub topic_type: TopicType,
    /// Scoping token, typically the run identifier.
    pub source: String,
}

impl TopicId {
    /// Build a topic for the given scope.
    pub fn new(topic_type: TopicType, source: impl Into<String>) -> Self {
        Self {
            topic_type,
            source: source.into(),
        }
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.topic_type, self.source)
    }
}

/// Fixed roles an agent instance can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgentType {
    /// Fans a document out and joins the branch results.
    Manager,
    /// Batch classifier for problem statement, requirements and expectations.
    Extractor,
    /// Single-shot outline generator.
    SectionGenerator,
    /// Terminal subscriber collecting final results.
    ResultSink,
}

impl AgentType {
    /// Role name used in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::Extractor => "extractor",
            Self::SectionGenerator => "section_generator",
            Self::ResultSink => "result_sink",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key used for single-run usage when no scope is involved.
pub const DEFAULT_AGENT_KEY: &str = "default";

/// Identity of one agent instance: its role plus an instance key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgentId {
    /// Role of the instance.
    pub agent_type: AgentType,
    /// Disambiguates concurrent instances of the same role.
    pub key: String,
}

impl AgentId {
    /// Identity for an explicit key.
    pub fn new(agent_type: AgentType, key: impl Into<String>) -> Self {
        Self {
            agent_type,
            key: key.into(),
        }
    }

    /// Identity keyed by [`DEFAULT_AGENT_KEY`].
    pub fn default_for(agent_type: AgentType) -> Self {
        Self::new(agent_type, DEFAULT_AGENT_KEY)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.agent_type, self.key)
    }
}
