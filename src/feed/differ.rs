//! Turns successive full event lists of a match into new, formatted updates.
//!
//! Event ids are never reused, so "new" is a set difference on ids. A field
//! that changes on an existing id is not reported again.

use std::collections::HashSet;

use crate::models::{DisplayUpdate, EventKind, MatchEvent, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardColour {
    Yellow,
    Red,
}

/// Events of `current` whose ids are absent from `previous`, in `current`'s order.
pub fn new_events(previous: &[MatchEvent], current: &[MatchEvent]) -> Vec<MatchEvent> {
    let known: HashSet<i64> = previous.iter().map(|e| e.id).collect();
    current
        .iter()
        .filter(|e| !known.contains(&e.id))
        .cloned()
        .collect()
}

pub fn side_of(event: &MatchEvent, home_team_id: i64) -> Side {
    if event.team.id == home_team_id {
        Side::Home
    } else {
        Side::Away
    }
}

/// A second yellow counts as a red.
pub fn card_colour(detail: Option<&str>) -> CardColour {
    let normalised: String = detail
        .unwrap_or("yellow")
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    match normalised.as_str() {
        "red" | "yellowred" | "secondyellow" | "redcard" => CardColour::Red,
        _ => CardColour::Yellow,
    }
}

pub fn goal_events(delta: &[MatchEvent]) -> impl Iterator<Item = &MatchEvent> {
    delta.iter().filter(|e| e.kind == EventKind::Goal)
}

fn who(name: Option<&String>) -> &str {
    name.map(String::as_str).filter(|n| !n.is_empty()).unwrap_or("Unknown")
}

fn format_one(event: &MatchEvent) -> String {
    let minute = event.minute;
    let team = event.team.label();
    match event.kind {
        EventKind::Goal => {
            let assist = match event.assist.as_deref() {
                Some(a) if !a.is_empty() => format!(" (assist: {})", a),
                _ => String::new(),
            };
            format!("⚽ {}' GOAL {}{} [{}]", minute, who(event.player.as_ref()), assist, team)
        }
        EventKind::Card => match card_colour(event.detail.as_deref()) {
            CardColour::Yellow => format!("🟨 {}' Yellow card {} [{}]", minute, who(event.player.as_ref()), team),
            CardColour::Red => format!("🟥 {}' Red card {} [{}]", minute, who(event.player.as_ref()), team),
        },
        EventKind::Substitution => format!(
            "🔄 {}' Substitution IN {} OUT {} [{}]",
            minute,
            who(event.player.as_ref()),
            who(event.player_out.as_ref()),
            team
        ),
        EventKind::Other => match event.player.as_deref() {
            Some(p) if !p.is_empty() => format!("• {}' {} [{}]", minute, p, team),
            _ => format!("• {}' [{}]", minute, team),
        },
    }
}

/// One display line per event, oldest new event first.
pub fn format_events(delta: &[MatchEvent], home_team_id: i64) -> Vec<DisplayUpdate> {
    delta
        .iter()
        .map(|e| DisplayUpdate {
            kind: e.kind,
            side: side_of(e, home_team_id),
            text: format_one(e),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::mock::{event, team};
    use crate::models::Team;

    fn home() -> Team {
        team(1, "Manchester United", "Man Utd")
    }

    fn away() -> Team {
        team(2, "Liverpool", "Liverpool")
    }

    fn history() -> Vec<MatchEvent> {
        vec![
            event(10, 12, EventKind::Goal, &home(), "Rashford"),
            event(11, 34, EventKind::Goal, &away(), "Salah"),
            event(12, 45, EventKind::Card, &home(), "Casemiro"),
        ]
    }

    #[test]
    fn test_same_list_has_no_new_events() {
        let prev = history();
        assert!(new_events(&prev, &prev).is_empty());
    }

    #[test]
    fn test_empty_previous_returns_everything_in_order() {
        let curr = history();
        let ids: Vec<i64> = new_events(&[], &curr).iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![10, 11, 12]);
    }

    #[test]
    fn test_appended_event_is_the_only_new_one() {
        let prev = history();
        let mut curr = prev.clone();
        curr.push(event(99, 70, EventKind::Goal, &away(), "Nunez"));
        let delta = new_events(&prev, &curr);
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].id, 99);
    }

    #[test]
    fn test_changed_fields_on_known_id_are_not_new() {
        let prev = history();
        let mut curr = prev.clone();
        curr[0].minute = 13;
        curr[0].assist = Some("Fernandes".into());
        assert!(new_events(&prev, &curr).is_empty());
    }

    #[test]
    fn test_new_events_keep_current_order_when_interleaved() {
        let prev = vec![history()[1].clone()];
        let ids: Vec<i64> = new_events(&prev, &history()).iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![10, 12]);
    }

    #[test]
    fn test_format_goal_with_assist_and_side() {
        let mut goal = event(1, 56, EventKind::Goal, &home(), "Fernandes");
        goal.assist = Some("Rashford".into());
        let away_goal = event(2, 60, EventKind::Goal, &away(), "Salah");
        let out = format_events(&[goal, away_goal], 1);

        assert_eq!(out[0].side, Side::Home);
        assert_eq!(out[0].kind, EventKind::Goal);
        assert_eq!(out[0].text, "⚽ 56' GOAL Fernandes (assist: Rashford) [Man Utd]");
        assert_eq!(out[1].side, Side::Away);
        assert_eq!(out[1].text, "⚽ 60' GOAL Salah [Liverpool]");
    }

    #[test]
    fn test_card_colours() {
        assert_eq!(card_colour(Some("yellow")), CardColour::Yellow);
        assert_eq!(card_colour(Some("Red")), CardColour::Red);
        assert_eq!(card_colour(Some("YellowRed")), CardColour::Red);
        assert_eq!(card_colour(Some("second_yellow")), CardColour::Red);
        assert_eq!(card_colour(None), CardColour::Yellow);

        let mut second = event(3, 80, EventKind::Card, &away(), "Konate");
        second.detail = Some("yellowred".into());
        let out = format_events(&[second], 1);
        assert_eq!(out[0].text, "🟥 80' Red card Konate [Liverpool]");
    }

    #[test]
    fn test_format_substitution_and_other() {
        let mut sub = event(4, 71, EventKind::Substitution, &away(), "Nunez");
        sub.player_out = Some("Gakpo".into());
        let mut other = event(5, 90, EventKind::Other, &home(), "");
        other.player = None;

        let out = format_events(&[sub, other], 1);
        assert_eq!(out[0].kind, EventKind::Substitution);
        assert_eq!(out[0].text, "🔄 71' Substitution IN Nunez OUT Gakpo [Liverpool]");
        assert_eq!(out[1].kind, EventKind::Other);
        assert_eq!(out[1].text, "• 90' [Man Utd]");
    }

    #[test]
    fn test_goal_events_filters_goals_only() {
        let goals: Vec<i64> = goal_events(&history()).map(|e| e.id).collect();
        assert_eq!(goals, vec![10, 11]);
    }
}
