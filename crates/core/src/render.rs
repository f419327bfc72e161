//! Message texts (HTML parse mode).

use crate::gateway::InlineButton;
use crate::types::{BotIdentity, Campaign, CampaignId, CampaignType, UserId};

/// Payload of a post button press, encoded as `<verb>:<campaign id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Count(CampaignId),
    Rules(CampaignId),
    ReferralCount(CampaignId),
    Boost(CampaignId),
}

impl CallbackAction {
    pub fn data(&self) -> String {
        match self {
            CallbackAction::Count(id) => format!("count:{}", id),
            CallbackAction::Rules(id) => format!("rules:{}", id),
            CallbackAction::ReferralCount(id) => format!("refcount:{}", id),
            CallbackAction::Boost(id) => format!("boost:{}", id),
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        let (verb, id) = data.split_once(':')?;
        let id: CampaignId = id.parse().ok()?;
        match verb {
            "count" => Some(CallbackAction::Count(id)),
            "rules" => Some(CallbackAction::Rules(id)),
            "refcount" => Some(CallbackAction::ReferralCount(id)),
            "boost" => Some(CallbackAction::Boost(id)),
            _ => None,
        }
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn participation_hint(kind: CampaignType) -> &'static str {
    match kind {
        CampaignType::DirectOptIn => "Open the mini-app to take part.",
        CampaignType::Referral => "Invite friends with your personal link; the most invites win.",
        CampaignType::SingleComment => "Reply to this post with <b>one</b> comment to take part.",
        CampaignType::BoostGated => "Boost the channel, then press \"Check boost\".",
    }
}

/// Public campaign post.
pub fn render_post(campaign: &Campaign) -> String {
    let mut text = format!("<b>{}</b>\n\n", escape_html(&campaign.title));
    if let Some(description) = campaign.description.as_deref() {
        text.push_str(&escape_html(description));
        text.push_str("\n\n");
    }
    text.push_str(&format!(
        "Ends: <b>{} UTC</b>\nWinners: <b>{}</b>\nID: <code>{}</code>\n\n{}",
        campaign.end_at.format("%Y-%m-%d %H:%M"),
        campaign.winners_count,
        campaign.id,
        participation_hint(campaign.kind),
    ));
    if !campaign.required_channels.is_empty() {
        text.push_str(&format!(
            "\nRequired subscriptions: {}",
            escape_html(&campaign.required_channels.join(", "))
        ));
    }
    text
}

fn callback(text: &str, action: CallbackAction) -> InlineButton {
    InlineButton::Callback {
        text: text.to_string(),
        data: action.data(),
    }
}

/// Buttons under the public post. Single-comment posts carry none so that
/// replies stay the only way in.
pub fn post_buttons(campaign: &Campaign, bot: &BotIdentity, app_short_name: &str) -> Vec<InlineButton> {
    let id = campaign.id;
    let mut buttons = match campaign.kind {
        CampaignType::DirectOptIn => vec![
            InlineButton::Url {
                text: "Take part".to_string(),
                url: bot.mini_app_link(app_short_name, id),
            },
            callback("Participants", CallbackAction::Count(id)),
        ],
        CampaignType::Referral => vec![
            InlineButton::Url {
                text: "My link".to_string(),
                url: bot.start_link(&format!("getreflink-{}", id)),
            },
            callback("My invites", CallbackAction::ReferralCount(id)),
        ],
        CampaignType::SingleComment => return vec![],
        CampaignType::BoostGated => vec![
            callback("Check boost", CallbackAction::Boost(id)),
            callback("Participants", CallbackAction::Count(id)),
        ],
    };
    buttons.push(callback("Rules", CallbackAction::Rules(id)));
    buttons
}

pub fn render_rules(campaign: &Campaign) -> String {
    let requirements = if campaign.required_channels.is_empty() {
        "No required subscriptions".to_string()
    } else {
        format!("Subscribe to: {}", campaign.required_channels.join(", "))
    };
    format!("How to take part:\n{}\n{}", plain_hint(campaign.kind), requirements)
}

fn plain_hint(kind: CampaignType) -> &'static str {
    match kind {
        CampaignType::DirectOptIn => "Open the mini-app and wait for the check.",
        CampaignType::Referral => "Share your personal link; each friend who opens it counts once.",
        CampaignType::SingleComment => "Leave one reply under the post.",
        CampaignType::BoostGated => "Boost the channel, then press \"Check boost\".",
    }
}

/// Results message; `winners` is ordered by place.
pub fn render_results(campaign: &Campaign, winners: &[UserId]) -> String {
    let body = if winners.is_empty() {
        "There were no participants. No winners.".to_string()
    } else {
        winners
            .iter()
            .enumerate()
            .map(|(i, uid)| format!("<a href=\"tg://user?id={}\">Winner #{}</a>", uid, i + 1))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "<b>RESULTS: {}</b>\n(deadline: {} UTC)\n\n{}",
        escape_html(&campaign.title),
        campaign.end_at.format("%Y-%m-%d %H:%M"),
        body
    )
}

pub fn render_winner_notice(campaign: &Campaign) -> String {
    format!(
        "Congratulations! You won the giveaway \"{}\". The organisers will contact you.",
        escape_html(&campaign.title)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::CampaignStatus;
    use chrono::{TimeZone, Utc};

    fn campaign() -> Campaign {
        let end = Utc.with_ymd_and_hms(2026, 3, 1, 18, 30, 0).unwrap();
        Campaign {
            id: 12,
            title: "Tea & <Cake>".to_string(),
            description: None,
            kind: CampaignType::DirectOptIn,
            start_at: end - chrono::Duration::days(1),
            end_at: end,
            required_channels: vec![],
            winners_count: 2,
            target_chat: "@news".to_string(),
            post: None,
            status: CampaignStatus::Drawing,
            created_by: 1,
            created_at: end - chrono::Duration::days(1),
            image_ref: None,
            lock_owner: None,
            claimed_at: None,
            drawn_at: None,
            announced: false,
        }
    }

    #[test]
    fn test_results_list_winners_in_place_order() {
        let text = render_results(&campaign(), &[30, 10]);
        assert!(text.contains("RESULTS: Tea &amp; &lt;Cake&gt;"));
        assert!(text.contains("2026-03-01 18:30 UTC"));
        let first = text.find("tg://user?id=30").unwrap();
        let second = text.find("tg://user?id=10").unwrap();
        assert!(first < second);
        assert!(text.contains("Winner #2"));
    }

    #[test]
    fn test_results_without_participants() {
        let text = render_results(&campaign(), &[]);
        assert!(text.contains("no participants"));
    }

    #[test]
    fn test_callback_action_parse() {
        for action in [
            CallbackAction::Count(3),
            CallbackAction::Rules(3),
            CallbackAction::ReferralCount(3),
            CallbackAction::Boost(3),
        ] {
            assert_eq!(CallbackAction::parse(&action.data()), Some(action));
        }
        assert_eq!(CallbackAction::parse("boost:x"), None);
        assert_eq!(CallbackAction::parse("menu:list"), None);
    }

    #[test]
    fn test_post_buttons_per_type() {
        let bot = BotIdentity {
            id: 1,
            username: "prize_bot".to_string(),
        };
        let mut c = campaign();
        let buttons = post_buttons(&c, &bot, "join");
        assert_eq!(
            buttons[0],
            InlineButton::Url {
                text: "Take part".to_string(),
                url: "https://t.me/prize_bot/join?startapp=gid-12".to_string(),
            }
        );
        assert_eq!(buttons.len(), 3);

        c.kind = CampaignType::SingleComment;
        assert!(post_buttons(&c, &bot, "join").is_empty());

        c.kind = CampaignType::BoostGated;
        let buttons = post_buttons(&c, &bot, "join");
        assert!(buttons.contains(&InlineButton::Callback {
            text: "Check boost".to_string(),
            data: "boost:12".to_string(),
        }));
    }

    #[test]
    fn test_post_mentions_requirements() {
        let mut c = campaign();
        c.required_channels = vec!["@a".to_string(), "@b".to_string()];
        let text = render_post(&c);
        assert!(text.contains("Required subscriptions: @a, @b"));
        assert!(text.contains("ID: <code>12</code>"));
    }
}
