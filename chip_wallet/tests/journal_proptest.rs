/// Property-based tests for journal consistency using proptest
///
/// These tests verify that the per-wallet journal stays consistent with the
/// authoritative balance across randomly generated operation sequences.
use chip_wallet::config::WalletConfig;
use chip_wallet::ledger::{
    DepositRequest, InitializeRequest, JournalFilter, WalletService, WithdrawRequest,
};
use chip_wallet::store::MemoryStore;
use proptest::prelude::*;
use std::sync::Arc;

const INITIAL_BALANCE: i64 = 1_000;

#[derive(Debug, Clone)]
enum Op {
    Deposit(i64),
    Withdraw(i64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1i64..=500).prop_map(Op::Deposit),
        (1i64..=500).prop_map(Op::Withdraw),
    ]
}

/// Reference model of what the wallet should do.
struct Model {
    balance: i64,
    deposited_today: i64,
    withdrawn_today: i64,
    config: WalletConfig,
}

impl Model {
    fn apply(&mut self, op: &Op) -> bool {
        match op {
            Op::Deposit(amount) => {
                if self.deposited_today + amount > self.config.daily_deposit_limit {
                    return false;
                }
                self.deposited_today += amount;
                self.balance += amount;
                true
            }
            Op::Withdraw(amount) => {
                if self.withdrawn_today + amount > self.config.daily_withdrawal_limit
                    || *amount > self.balance
                {
                    return false;
                }
                self.withdrawn_today += amount;
                self.balance -= amount;
                true
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_journal_matches_model_over_random_ops(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime should build");

        rt.block_on(async {
            let config = WalletConfig::default();
            let store = Arc::new(MemoryStore::new());
            let service = WalletService::load(config.clone(), store)
                .await
                .expect("service should load");

            service
                .initialize(InitializeRequest {
                    player_id: "p1".to_string(),
                    initial_balance: Some(INITIAL_BALANCE),
                })
                .await
                .expect("initialize should succeed");

            let mut model = Model {
                balance: INITIAL_BALANCE,
                deposited_today: 0,
                withdrawn_today: 0,
                config,
            };

            for op in &ops {
                let accepted = match op {
                    Op::Deposit(amount) => service
                        .deposit(DepositRequest {
                            player_id: "p1".to_string(),
                            amount: *amount,
                            description: None,
                        })
                        .await
                        .is_ok(),
                    Op::Withdraw(amount) => service
                        .withdraw(WithdrawRequest {
                            player_id: "p1".to_string(),
                            amount: *amount,
                            description: None,
                        })
                        .await
                        .is_ok(),
                };
                let model_accepted = model.apply(op);
                prop_assert_eq!(
                    accepted,
                    model_accepted,
                    "service and model disagree on {:?}",
                    op
                );

                let view = service.wallet_view("p1").await.expect("wallet should exist");
                prop_assert_eq!(view.balance, model.balance);
                prop_assert!(view.balance >= 0, "balance must never go negative");
            }

            // The journal replays to the final balance: post_balance of each
            // entry equals the running sum of signed amounts.
            let mut entries = service
                .transactions(JournalFilter {
                    player_id: Some("p1".to_string()),
                    limit: 500,
                    ..JournalFilter::default()
                })
                .await;
            entries.reverse(); // oldest first

            let mut running = 0i64;
            for entry in &entries {
                running += entry.amount;
                prop_assert_eq!(
                    entry.post_balance,
                    running,
                    "post_balance must equal the running sum"
                );
            }
            prop_assert_eq!(running, model.balance);

            Ok(())
        })?;
    }
}
