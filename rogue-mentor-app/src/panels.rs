//! Text renderings of the archive, field manual and identity panels.

use chrono::{Local, TimeZone};
use rogue_mentor_memory::{Message, Role, SessionState};

/// Messages shown when the REPL starts.
pub const RECENT_MESSAGES: usize = 6;

pub const SAMPLE_PROMPTS: [&str; 15] = [
    "Draft a 3-month plan for asymmetric leverage in Web3",
    "How do I bypass HR and DM founders directly?",
    "What's the fastest path from zero to $10K/month freelancing?",
    "How do I build a personal monopoly in my niche?",
    "Give me a cold email template that actually gets responses",
    "How do I negotiate a 50% raise without threatening to quit?",
    "What skills should I stack for maximum optionality?",
    "How do I position myself as an expert in 90 days?",
    "What's the anti-resume strategy for getting hired?",
    "How do I turn my side project into an acquisition target?",
    "Give me a networking strategy that doesn't feel sleazy",
    "How do I get meetings with people way above my level?",
    "What's the playbook for pivoting industries at 30+?",
    "How do I build in public without revealing my competitive edge?",
    "What are the highest-leverage activities for career growth?",
];

/// 1-based lookup into the field manual.
pub fn sample_prompt(number: usize) -> Option<&'static str> {
    number
        .checked_sub(1)
        .and_then(|index| SAMPLE_PROMPTS.get(index))
        .copied()
}

pub fn format_message(message: &Message) -> String {
    let tag = match message.role {
        Role::User => "OP",
        Role::Assistant => "RM",
    };
    let time = Local
        .timestamp_millis_opt(message.timestamp)
        .single()
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    format!("[{}] {} ▸ {}", time, tag, message.content)
}

pub fn recent(messages: &[Message], count: usize) -> &[Message] {
    &messages[messages.len().saturating_sub(count)..]
}

pub fn archive(state: &SessionState) -> String {
    let mut out = String::new();
    out.push_str("═══ MISSION ARCHIVE ═══\n");
    out.push_str(&format!("{} transmissions logged\n\n", state.messages.len()));
    out.push_str(&format!(
        "Mission XP {}%  {}  LEVEL {}\n",
        state.xp,
        progress_bar(state.xp),
        state.level()
    ));
    out.push_str(&format!(
        "{}/{} COMPLETE\n\n",
        state.missions_completed, state.total_missions
    ));

    if state.messages.is_empty() {
        out.push_str("No transmissions yet.\nInitiate contact with Rogue Mentor.\n");
    } else {
        for message in &state.messages {
            out.push_str(&format_message(message));
            out.push('\n');
        }
        out.push_str("\n/purge to PURGE ARCHIVE\n");
    }
    out
}

fn progress_bar(xp: u32) -> String {
    let filled = (xp.min(100) / 5) as usize;
    format!("[{}{}]", "█".repeat(filled), "░".repeat(20 - filled))
}

pub fn intel() -> String {
    let mut out = String::new();
    out.push_str("═══ FIELD MANUAL ═══\n");
    out.push_str("High-leverage tactical queries\n\n");
    for (index, prompt) in SAMPLE_PROMPTS.iter().enumerate() {
        out.push_str(&format!("{:02}  {}\n", index + 1, prompt));
    }
    out.push_str("\nSelect a query to deploy: /intel <n>\n");
    out
}

pub fn identity() -> String {
    [
        "═══ IDENTITY PROTOCOLS ═══",
        "Developed by Umer Khan",
        "",
        "INTELLIGENCE BRIEFING",
        "Rogue Mentor is an advanced career intelligence engine architected by Umer Khan. \
         It utilizes a proprietary, highly-conditioned API framework designed to dismantle \
         standard corporate indoctrination and equip professionals with asymmetric tactical leverage.",
        "",
        "OPERATIONAL PRIVACY",
        "Protocol Data: All mission logs are kept in local storage on this machine. \
         Intel is processed through the configured model gateway; no personal data is \
         retained beyond it.",
        "Voice Processing: Audio input is decoded by the local speech engine. No biometric \
         or voice data is captured or transmitted beyond the immediate session.",
        "",
        "RULES OF ENGAGEMENT",
        "Field Responsibility: Rogue Mentor provides raw, unconventional intelligence. \
         These strategies are high-velocity by design. All operational decisions remain \
         the responsibility of the Operator.",
        "Professional Disclaimer: Tactical briefings do not constitute legal or financial \
         counsel. Consult specialized operatives for specific field-legalities.",
        "",
        "© 2026 | DESIGNED & ENGINEERED BY UMER KHAN",
    ]
    .join("\n")
}
