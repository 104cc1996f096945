mod common;

use std::thread;

use anchor_lang::prelude::*;
use common::*;
use earn_engine::*;

const THREADS: usize = 16;

fn register(h: &Harness) -> Pubkey {
    let mint = Pubkey::new_unique();
    h.engine
        .register(scenario_registration(mint, Pubkey::new_unique()), None)
        .unwrap();
    mint
}

#[test]
fn concurrent_duplicate_stake_executes_once() {
    let h = harness();
    let mint = register(&h);
    let user = Pubkey::new_unique();
    let args = StakeArgs {
        token_mint: mint,
        user,
        amount: 100,
    };

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| s.spawn(|| h.engine.stake(args.clone(), Some("stake-1"))))
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    let mut fresh = 0;
    for result in &results {
        match result {
            Ok(op) => {
                if !op.replayed {
                    fresh += 1;
                }
            }
            // A duplicate can land while the first is still running
            Err(e) => assert_eq!(*e, EarnError::OperationInProgress.into()),
        }
    }
    assert_eq!(fresh, 1);

    let pool = h.engine.staking_pool(&mint).unwrap().unwrap();
    assert_eq!(pool.total_staked, 100);
    assert_eq!(pool.staker_count, 1);
    assert_eq!(h.engine.stake_account(&mint, &user).unwrap().unwrap().staked_amount, 100);
}

#[test]
fn concurrent_trades_lose_no_updates() {
    const ITERATIONS: usize = 50;
    let h = harness();
    let mint = register(&h);
    let other = register(&h);

    thread::scope(|s| {
        for i in 0..THREADS {
            // Odd threads trade a second token to contend on the shared stats
            let target = if i % 2 == 0 { mint } else { other };
            let engine = &h.engine;
            s.spawn(move || {
                for _ in 0..ITERATIONS {
                    engine
                        .record_trade(
                            RecordTradeArgs {
                                token_mint: target,
                                trade_amount: 1_000_000,
                                direction: TradeDirection::Sell,
                            },
                            None,
                        )
                        .unwrap();
                }
            });
        }
    });

    let per_token = (THREADS / 2 * ITERATIONS) as u64;
    for token in [mint, other] {
        let treasury = h.engine.treasury(&token).unwrap().unwrap();
        assert_eq!(treasury.trade_count, per_token);
        assert_eq!(treasury.sell_volume, per_token * 1_000_000);
        assert_eq!(treasury.total_fees_collected, per_token * 30_000);
    }

    let stats = h.engine.protocol_stats().unwrap();
    assert_eq!(stats.total_fees_processed, 2 * per_token * 30_000);
}
