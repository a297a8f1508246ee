//! Manpower from the four-digit situation code.
//!
//! Digits are, in order: away goalie (0/1), away skaters, home skaters,
//! home goalie (0/1). Skater counts include an extra attacker when a
//! goalie is pulled.

use crate::domain::Strength;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SituationCode {
    pub away_goalie: u8,
    pub away_skaters: u8,
    pub home_skaters: u8,
    pub home_goalie: u8,
}

/// Situation seen from the shooting team
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Manpower {
    pub own_skaters: u8,
    pub opp_skaters: u8,
    pub own_goalie: bool,
    pub opp_goalie: bool,
    pub strength: Strength,
}

impl Manpower {
    pub fn is_power_play(&self) -> bool {
        self.strength == Strength::PowerPlay
    }

    pub fn is_empty_net(&self) -> bool {
        !self.opp_goalie
    }
}

impl SituationCode {
    pub fn parse(code: &str) -> Option<Self> {
        let code = code.trim();
        if code.len() != 4 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let d: Vec<u8> = code.bytes().map(|b| b - b'0').collect();
        let parsed = Self {
            away_goalie: d[0],
            away_skaters: d[1],
            home_skaters: d[2],
            home_goalie: d[3],
        };
        let goalie_ok = |g: u8| g <= 1;
        let skaters_ok = |s: u8| (3..=6).contains(&s);
        (goalie_ok(parsed.away_goalie)
            && goalie_ok(parsed.home_goalie)
            && skaters_ok(parsed.away_skaters)
            && skaters_ok(parsed.home_skaters))
        .then_some(parsed)
    }

    pub fn relative_to(&self, shooter_is_home: bool) -> Manpower {
        let (own_skaters, own_goalie, opp_skaters, opp_goalie) = if shooter_is_home {
            (self.home_skaters, self.home_goalie, self.away_skaters, self.away_goalie)
        } else {
            (self.away_skaters, self.away_goalie, self.home_skaters, self.home_goalie)
        };

        // an extra attacker for a pulled goalie is not a manpower advantage
        let own_effective = own_skaters - u8::from(own_goalie == 0);
        let opp_effective = opp_skaters - u8::from(opp_goalie == 0);

        let strength = if opp_goalie == 0 {
            Strength::EmptyNet
        } else if own_effective > opp_effective {
            Strength::PowerPlay
        } else if own_effective < opp_effective {
            Strength::PenaltyKill
        } else {
            Strength::EvenStrength
        };

        Manpower {
            own_skaters,
            opp_skaters,
            own_goalie: own_goalie == 1,
            opp_goalie: opp_goalie == 1,
            strength,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_strength() {
        let m = SituationCode::parse("1551").unwrap().relative_to(true);
        assert_eq!(m.strength, Strength::EvenStrength);
        assert_eq!((m.own_skaters, m.opp_skaters), (5, 5));
        assert!(!m.is_empty_net());
    }

    #[test]
    fn power_play_is_relative_to_shooter() {
        let code = SituationCode::parse("1451").unwrap();
        assert_eq!(code.relative_to(true).strength, Strength::PowerPlay);
        assert_eq!(code.relative_to(false).strength, Strength::PenaltyKill);
        assert!(code.relative_to(true).is_power_play());
    }

    #[test]
    fn empty_net_and_extra_attacker() {
        // away goalie pulled, six away skaters
        let code = SituationCode::parse("0651").unwrap();
        let home = code.relative_to(true);
        assert_eq!(home.strength, Strength::EmptyNet);
        assert!(home.is_empty_net());
        let away = code.relative_to(false);
        assert_eq!(away.strength, Strength::EvenStrength);
        assert_eq!(away.own_skaters, 6);
    }

    #[test]
    fn rejects_garbage() {
        assert!(SituationCode::parse("151").is_none());
        assert!(SituationCode::parse("2551").is_none());
        assert!(SituationCode::parse("1591").is_none());
        assert!(SituationCode::parse("abcd").is_none());
    }
}
