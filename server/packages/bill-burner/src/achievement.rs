//! Snarky achievement text for the share card.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

struct Tier {
    /// Exclusive upper bound of the tier.
    below: f64,
    title: &'static str,
    messages: [&'static str; 3],
}

const TIERS: [Tier; 6] = [
    Tier {
        below: 1_000.0,
        title: "Baby's First Burn",
        messages: [
            "Baby's First Burn! You've wasted ${amount} on AWS. That's like 200 coffees you'll never drink, but at least your Lambda functions are 'serverless'.",
            "Congratulations! You spent ${amount} learning that 'free tier' doesn't mean 'free forever'. Your credit card company sends their regards.",
            "Achievement Unlocked: ${amount} burned! That's enough to subscribe to Netflix for 5 years, but you chose NAT Gateways instead. Bold choice.",
        ],
    },
    Tier {
        below: 5_000.0,
        title: "Down The Drain",
        messages: [
            "Impressive! ${amount} down the drain. You could've bought a decent used car, but instead you got EC2 instances running at 3% CPU. Living the dream!",
            "You've burned ${amount}! That's a nice vacation you're not taking because you forgot to turn off your RDS instances. Hope those logs were worth it.",
            "${amount} wasted! Your accountant called - they want to know why you need 47 load balancers for a todo app. We're wondering too.",
        ],
    },
    Tier {
        below: 10_000.0,
        title: "Enterprise Architect",
        messages: [
            "Holy overspending! ${amount} burned! You could've bought a luxury car, but instead you got 50 Kubernetes nodes running at 2% CPU. Your DevOps team is impressed by your commitment to waste.",
            "Congratulations on burning ${amount}! That's enough to hire a junior developer for 3 months, but you chose SageMaker instances running 24/7 instead. Priorities!",
            "${amount} obliterated! You've achieved 'Enterprise Architect' level waste. Your CloudFront distribution for localhost is particularly inspired.",
        ],
    },
    Tier {
        below: 25_000.0,
        title: "Legendary Waste",
        messages: [
            "LEGENDARY WASTE! ${amount} burned! You could've made a down payment on a house, but you chose to run AWS Ground Station for your weather app. Respect.",
            "${amount} incinerated! That's a year of college tuition, but instead you have multi-region active-active deployment for your personal blog. Chef's kiss.",
            "You've torched ${amount}! Your CFO is crying, your CTO is confused, and AWS is sending you a thank-you card. This is art.",
        ],
    },
    Tier {
        below: 50_000.0,
        title: "Hall Of Fame",
        messages: [
            "ABSOLUTE MADNESS! ${amount} BURNED! You could've bought a Tesla, but you chose AWS Outposts for your cloud-native app. The irony is not lost on us.",
            "${amount} ANNIHILATED! That's a small business you could've started, but instead you have 200 idle EC2 instances. Your legacy will live forever in AWS billing history.",
            "HALL OF FAME WASTE! ${amount} destroyed! You've transcended mere incompetence and achieved pure chaos. AWS named a data center after you.",
        ],
    },
    Tier {
        below: f64::INFINITY,
        title: "Cosmic Destruction",
        messages: [
            "COSMIC LEVEL DESTRUCTION! ${amount} VAPORIZED! You've achieved what we thought was impossible. AWS is considering making you a board member.",
            "${amount} OBLITERATED FROM EXISTENCE! Your spending has its own gravitational field. Scientists are studying your billing statements.",
            "ULTIMATE ACHIEVEMENT! ${amount} BURNED! You've won AWS Bill Burner. There's nothing left to burn. Your name will be whispered in hushed tones at FinOps conferences.",
        ],
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Achievement {
    pub title: String,
    pub text: String,
}

fn tier_for(amount: f64) -> &'static Tier {
    TIERS
        .iter()
        .find(|tier| amount < tier.below)
        .unwrap_or(&TIERS[TIERS.len() - 1])
}

pub fn achievement<R: Rng + ?Sized>(amount: f64, rng: &mut R) -> Achievement {
    let tier = tier_for(amount);
    let template = tier.messages.choose(rng).unwrap_or(&tier.messages[0]);
    Achievement {
        title: tier.title.to_string(),
        text: template.replace("{amount}", &format_amount(amount)),
    }
}

pub fn achievement_text<R: Rng + ?Sized>(amount: f64, rng: &mut R) -> String {
    achievement(amount, rng).text
}

/// `1234567.891` -> `1,234,567.891`; at most three fraction digits.
pub fn format_amount(amount: f64) -> String {
    let rounded = format!("{:.3}", amount.abs());
    let (whole, fraction) = rounded.split_once('.').unwrap_or((rounded.as_str(), ""));
    let fraction = fraction.trim_end_matches('0');

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 { "-" } else { "" };
    if fraction.is_empty() {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}.{fraction}")
    }
}
