//! End-to-end domain flow without persistence: mint, trade, evaluate the
//! redistribution policy against the ledger.

use pewpi_core::{
    COMMUNITY_POOL, RedistributionPolicy, SECS_PER_DAY, Session, Token, TokenDraft, TokenQuery,
    TokenStatus, Transfer, TransferReason, active_traders, last_activity,
};
use rand::SeedableRng;
use rand::rngs::SmallRng;

fn rng() -> SmallRng {
    SmallRng::seed_from_u64(42)
}

fn draft(name: &str, symbol: &str, amount: u64, creator: &str) -> TokenDraft {
    TokenDraft {
        name: name.to_string(),
        symbol: symbol.to_string(),
        amount,
        creator: creator.to_string(),
        metadata: serde_json::Map::new(),
    }
}

fn transfer(symbol: &str, from: &str, to: Option<&str>, ts: u64, reason: TransferReason) -> Transfer {
    Transfer {
        token_symbol: symbol.to_string(),
        from_owner: from.to_string(),
        to_owner: to.map(str::to_string),
        amount: 1,
        timestamp: ts,
        reason,
    }
}

#[test]
fn mint_trade_and_query() {
    let mut rng = rng();
    let now = 100 * SECS_PER_DAY;

    let brain = Token::mint(draft("Brain", "BRN", 100, "u1"), now, &mut rng).unwrap();
    let pew = Token::mint(draft("Pew", "PEW", 50, "u2"), now + 60, &mut rng).unwrap();
    assert_ne!(brain.id, pew.id);

    let mut alice = Session::new("u1", "alice", now);
    alice.credit("BRN", brain.amount);
    assert_eq!(alice.balance("BRN"), 100);
    assert_eq!(alice.spend("BRN", 40).unwrap(), 60);
    assert!(alice.spend("BRN", 70).is_err());
    assert_eq!(alice.balance("BRN"), 60);

    let all = vec![brain.clone(), pew];
    let mine = TokenQuery::new().creator("u1").apply(all);
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, brain.id);
}

#[test]
fn idle_token_goes_to_an_active_trader() {
    let mut rng = rng();
    let now = 100 * SECS_PER_DAY;
    let policy = RedistributionPolicy::default();

    // BRN last moved 31 days ago; PEW traded recently by u2 and u3.
    let log = vec![
        transfer("BRN", "u1", Some("u2"), now - 31 * SECS_PER_DAY, TransferReason::Mint),
        transfer("PEW", "u2", Some("u3"), now - 2 * SECS_PER_DAY, TransferReason::Transfer),
        transfer("PEW", "u3", Some("u2"), now - SECS_PER_DAY, TransferReason::Transfer),
    ];

    let last = last_activity(&log, "BRN").unwrap();
    assert_eq!(policy.status(last, now), TokenStatus::Redistributable);

    let census = active_traders(&log, policy.window_start(now), policy.min_trades);
    assert_eq!(census, vec!["u2", "u3"]);

    let recipient = policy.pick_recipient(&census, &mut rng);
    assert!(census.contains(&recipient));
}

#[test]
fn idle_token_without_traders_goes_to_the_pool() {
    let mut rng = rng();
    let now = 100 * SECS_PER_DAY;
    let policy = RedistributionPolicy::default();

    let log = vec![transfer(
        "BRN",
        "u1",
        Some("u2"),
        now - 40 * SECS_PER_DAY,
        TransferReason::Mint,
    )];

    let census = active_traders(&log, policy.window_start(now), policy.min_trades);
    assert!(census.is_empty());
    assert_eq!(policy.pick_recipient(&census, &mut rng), COMMUNITY_POOL);
}

#[test]
fn warning_ladder_approaching_deadline() {
    let now = 100 * SECS_PER_DAY;
    let policy = RedistributionPolicy::default();

    let cases = [
        (10, TokenStatus::Active),
        (23, TokenStatus::WarnAt(7)),
        (27, TokenStatus::WarnAt(3)),
        (29, TokenStatus::WarnAt(1)),
        (30, TokenStatus::Redistributable),
    ];
    for (idle_days, expected) in cases {
        let last = now - idle_days * SECS_PER_DAY;
        assert_eq!(
            policy.status(last, now),
            expected,
            "idle {idle_days} days"
        );
    }
}
