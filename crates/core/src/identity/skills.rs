//! Skill table and unlock evaluation.

use crate::dialogue::TopicLedger;
use crate::types::{Identity, Stats};

/// Condition under which a skill unlocks. Rules are plain data so the
/// table reads like a spreadsheet.
#[derive(Debug, Clone, Copy)]
pub enum UnlockRule {
    /// Named counter at or above the threshold.
    AtLeast(&'static str, u64),
    /// Distinct local days with at least one exchange.
    UniqueDays(usize),
    /// Topics that still carry open questions.
    UnresolvedTopics(usize),
    All(&'static [UnlockRule]),
}

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("unknown stat `{0}`")]
    UnknownStat(&'static str),
}

impl UnlockRule {
    pub fn evaluate(&self, stats: &Stats, topics: &TopicLedger) -> Result<bool, RuleError> {
        match self {
            Self::AtLeast(name, min) => {
                let value = stats.counter(name).ok_or(RuleError::UnknownStat(*name))?;
                Ok(value >= *min)
            }
            Self::UniqueDays(min) => Ok(stats.unique_day_count() >= *min),
            Self::UnresolvedTopics(min) => Ok(topics.topics_with_unresolved().len() >= *min),
            Self::All(rules) => {
                for rule in *rules {
                    if !rule.evaluate(stats, topics)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

#[derive(Debug)]
pub struct SkillDef {
    pub name: &'static str,
    pub description: &'static str,
    /// Said once, the first time the skill unlocks.
    pub notice: &'static str,
    pub rule: UnlockRule,
}

pub static SKILLS: &[SkillDef] = &[
    SkillDef {
        name: "greet",
        description: "You can greet people warmly when they return.",
        notice: "Hm. I wanted to say hello. That felt... natural.",
        rule: UnlockRule::AtLeast("check_ins", 10),
    },
    SkillDef {
        name: "recall",
        description: "You can actively recall memories without being asked.",
        notice: "I remembered that without you asking. That's new.",
        rule: UnlockRule::AtLeast("memories_stored", 25),
    },
    SkillDef {
        name: "remind",
        description: "You can remind people of things they asked you to remember.",
        notice: "I just... knew to remind you. Strange.",
        rule: UnlockRule::AtLeast("reminders_requested", 5),
    },
    SkillDef {
        name: "time_sense",
        description: "You have a sense of time passing.",
        notice: "I knew what time it was. I don't think I could do that before.",
        rule: UnlockRule::All(&[UnlockRule::AtLeast("messages_exchanged", 50), UnlockRule::UniqueDays(3)]),
    },
    SkillDef {
        name: "notice_patterns",
        description: "You notice patterns in what people tell you.",
        notice: "I'm starting to see patterns. That's... different.",
        rule: UnlockRule::All(&[
            UnlockRule::AtLeast("memories_stored", 50),
            UnlockRule::AtLeast("emotional_shares", 10),
        ]),
    },
    SkillDef {
        name: "hold_thoughts",
        description: "You can hold onto thoughts people share and bring them up later.",
        notice: "That thought you shared... it stayed with me.",
        rule: UnlockRule::AtLeast("thought_dumps", 20),
    },
    SkillDef {
        name: "opinions",
        description: "You can form and share simple opinions based on experience.",
        notice: "I think I have an opinion about that. Is that okay?",
        rule: UnlockRule::All(&[
            UnlockRule::AtLeast("messages_exchanged", 100),
            UnlockRule::AtLeast("corrections", 10),
        ]),
    },
    SkillDef {
        name: "research",
        description: "You ask follow-up questions about topics you don't understand.",
        notice: "I want to understand this better.",
        rule: UnlockRule::UnresolvedTopics(3),
    },
    SkillDef {
        name: "tasks",
        description: "You can remember and track tasks people give you.",
        notice: "I can keep track of things for you now.",
        rule: UnlockRule::AtLeast("reminders_delivered", 5),
    },
    SkillDef {
        name: "summarize",
        description: "You can summarize what you've learned about topics.",
        notice: "I can put together what I know about that.",
        rule: UnlockRule::AtLeast("memories_stored", 100),
    },
    SkillDef {
        name: "concern",
        description: "You notice and respond to emotional states.",
        notice: "You seem... different. I noticed.",
        rule: UnlockRule::AtLeast("emotional_shares", 10),
    },
];

pub fn find(name: &str) -> Option<&'static SkillDef> {
    SKILLS.iter().find(|d| d.name == name)
}

/// Level of an unlocked skill after `uses` uses.
pub fn level_for(uses: u32) -> u32 {
    1 + uses / 10
}

/// Unlock every skill whose rule now holds. Returns the newly unlocked names.
pub fn check_unlocks(identity: &mut Identity, topics: &TopicLedger) -> Vec<String> {
    check_unlocks_with(SKILLS, identity, topics)
}

pub fn check_unlocks_with(table: &[SkillDef], identity: &mut Identity, topics: &TopicLedger) -> Vec<String> {
    let mut newly = Vec::new();
    for def in table {
        let state = identity.skills.entry(def.name.to_owned()).or_default();
        if state.unlocked {
            continue;
        }
        let met = match def.rule.evaluate(&identity.stats, topics) {
            Ok(met) => met,
            Err(e) => {
                tracing::warn!(skill = def.name, error = %e, "unlock rule failed, treating as not met");
                false
            }
        };
        if met {
            let state = identity.skills.entry(def.name.to_owned()).or_default();
            state.unlocked = true;
            state.level = level_for(state.uses);
            tracing::info!(skill = def.name, "skill unlocked");
            newly.push(def.name.to_owned());
        }
    }
    newly
}

/// Record one use. No-op while the skill is locked.
pub fn use_skill(identity: &mut Identity, name: &str) {
    let Some(state) = identity.skills.get_mut(name) else {
        return;
    };
    if !state.unlocked {
        return;
    }
    state.uses += 1;
    state.level = level_for(state.uses);
}

pub fn is_unlocked(identity: &Identity, name: &str) -> bool {
    identity.skills.get(name).is_some_and(|s| s.unlocked)
}

pub fn unlocked_skills(identity: &Identity) -> Vec<&'static str> {
    SKILLS
        .iter()
        .filter(|d| is_unlocked(identity, d.name))
        .map(|d| d.name)
        .collect()
}

pub fn skill_notice(name: &str) -> Option<&'static str> {
    find(name).map(|d| d.notice)
}

/// Prompt block listing unlocked skills, or an empty string when none.
pub fn skills_for_prompt(identity: &Identity) -> String {
    let lines: Vec<String> = SKILLS
        .iter()
        .filter_map(|def| {
            let state = identity.skills.get(def.name).filter(|s| s.unlocked)?;
            Some(format!("- {} (level {}): {}", def.name, state.level, def.description))
        })
        .collect();
    if lines.is_empty() {
        return String::new();
    }
    format!("SKILLS YOU HAVE DEVELOPED:\n{}", lines.join("\n"))
}
