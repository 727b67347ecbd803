//! Escrow ledger: funded accounts and metered payment streams.
//!
//! The keeper is the only component that moves value. Every mutating call
//! settles the account first, so accrual is always up to date with the
//! transaction height before anything else happens.
//!
//! ## Settlement
//!
//! An account accrues `rate × (height − settled_at)` for each Active payment,
//! in ascending payment-key order (lease payments by group, then order, then
//! provider), drawing from the owner-funded `balance` before the
//! depositor-funded `funds`. When the account cannot cover the total:
//!
//! 1. each payment receives what is left, in key order
//! 2. every Active payment and the account become Overdrawn
//! 3. accrued payment balances are paid out to their payees
//! 4. `PaymentClosed` notices (key order) then one `AccountClosed` notice are
//!    queued on the transaction for the hook subscribers
//!
//! Balances never go negative.

use leasematch_types::{
    Account, AccountId, AccountState, Address, DecCoin, EscrowNotice, KeyBuilder, KvStore,
    LedgerError, LedgerEvent, Payment, PaymentId, PaymentState, Result, TxContext, constants,
    load, load_prefix, save,
};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::bank::Bank;

const ACCOUNT_PREFIX: u8 = 0x10;
const PAYMENT_PREFIX: u8 = 0x11;

fn account_key(id: &AccountId) -> Vec<u8> {
    KeyBuilder::new(ACCOUNT_PREFIX)
        .str(&id.scope.to_string())
        .str(&id.xid)
        .build()
}

fn payments_of(id: &AccountId) -> KeyBuilder {
    KeyBuilder::new(PAYMENT_PREFIX)
        .str(&id.scope.to_string())
        .str(&id.xid)
}

/// Lease payments sort by (owner, dseq, gseq, oseq, provider), ahead of any
/// payment whose id is not a lease id.
fn payment_key(account: &AccountId, payment: &PaymentId) -> Vec<u8> {
    let key = payments_of(account);
    match payment.lease() {
        Ok(lease) => key
            .u8(0)
            .str(lease.owner.as_str())
            .u64(lease.dseq)
            .u32(lease.gseq)
            .u32(lease.oseq)
            .str(lease.provider.as_str())
            .build(),
        Err(_) => key.u8(1).str(&payment.0).build(),
    }
}

/// Take `amount` out of the account, `balance` first.
fn draw(account: &mut Account, amount: &DecCoin) -> Result<()> {
    let from_balance = account.balance.clone().min(amount.clone());
    let from_funds = amount.checked_sub(&from_balance)?;
    account.balance = account.balance.checked_sub(&from_balance)?;
    account.funds = account.funds.checked_sub(&from_funds)?;
    account.transferred = account.transferred.checked_add(amount)?;
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EscrowKeeper {
    bank: Bank,
}

impl EscrowKeeper {
    #[must_use]
    pub fn new(bank: Bank) -> Self {
        Self { bank }
    }

    #[must_use]
    pub fn bank(&self) -> &Bank {
        &self.bank
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    pub fn get_account(&self, store: &dyn KvStore, id: &AccountId) -> Result<Option<Account>> {
        load(store, &account_key(id))
    }

    pub fn get_payment(
        &self,
        store: &dyn KvStore,
        account: &AccountId,
        payment: &PaymentId,
    ) -> Result<Option<Payment>> {
        load(store, &payment_key(account, payment))
    }

    /// Payments of one account, ascending by payment key.
    pub fn payments_for_account(
        &self,
        store: &dyn KvStore,
        id: &AccountId,
    ) -> Result<Vec<Payment>> {
        load_prefix(store, &payments_of(id).build())
    }

    /// Every account, ascending by key.
    pub fn accounts(&self, store: &dyn KvStore) -> Result<Vec<Account>> {
        load_prefix(store, &[ACCOUNT_PREFIX])
    }

    /// Every payment, ascending by key.
    pub fn payments(&self, store: &dyn KvStore) -> Result<Vec<Payment>> {
        load_prefix(store, &[PAYMENT_PREFIX])
    }

    fn require_account(&self, store: &dyn KvStore, id: &AccountId) -> Result<Account> {
        self.get_account(store, id)?
            .ok_or_else(|| LedgerError::AccountNotFound(id.clone()))
    }

    fn require_payment(
        &self,
        store: &dyn KvStore,
        account: &AccountId,
        payment: &PaymentId,
    ) -> Result<Payment> {
        self.get_payment(store, account, payment)?
            .ok_or_else(|| LedgerError::PaymentNotFound {
                account: account.clone(),
                payment: payment.clone(),
            })
    }

    // -----------------------------------------------------------------
    // Accounts
    // -----------------------------------------------------------------

    /// Open an account funded with `deposit` from `depositor`.
    ///
    /// A self-funded deposit lands in `balance`; a third-party deposit in
    /// `funds`.
    ///
    /// # Errors
    /// - `AccountExists` if `id` is already present
    /// - `InsufficientFunds` if `depositor` cannot cover `deposit`
    pub fn open_account(
        &self,
        ctx: &mut TxContext<'_>,
        id: AccountId,
        owner: &Address,
        depositor: &Address,
        deposit: &DecCoin,
    ) -> Result<Account> {
        owner.validate()?;
        depositor.validate()?;
        if !deposit.is_valid() {
            return Err(LedgerError::InvalidAmount(format!("invalid deposit {deposit}")));
        }
        if self.get_account(&*ctx, &id)?.is_some() {
            return Err(LedgerError::AccountExists(id));
        }

        self.bank
            .send_to_module(ctx, depositor, constants::ESCROW_MODULE_ACCOUNT, deposit)?;

        let zero = DecCoin::zero(deposit.denom.clone());
        let (balance, funds) = if depositor == owner {
            (deposit.clone(), zero.clone())
        } else {
            (zero.clone(), deposit.clone())
        };
        let account = Account {
            id,
            owner: owner.clone(),
            depositor: depositor.clone(),
            state: AccountState::Open,
            balance,
            funds,
            transferred: zero,
            settled_at: ctx.height(),
        };
        save(ctx, account_key(&account.id), &account)?;
        ctx.emit(LedgerEvent::AccountOpened {
            id: account.id.clone(),
            deposit: deposit.clone(),
        });
        debug!(account = %account.id, deposit = %deposit, "escrow account opened");
        Ok(account)
    }

    /// Top up an Open account, then settle it.
    ///
    /// # Errors
    /// - `AccountNotFound` / `AccountNotOpen`
    /// - `InvalidAddress` if `depositor` is neither the owner nor the
    ///   account's depositor
    /// - `InsufficientFunds` if `depositor` cannot cover `amount`
    pub fn deposit(
        &self,
        ctx: &mut TxContext<'_>,
        id: &AccountId,
        depositor: &Address,
        amount: &DecCoin,
    ) -> Result<Account> {
        let mut account = self.require_account(&*ctx, id)?;
        if account.state != AccountState::Open {
            return Err(LedgerError::AccountNotOpen {
                id: id.clone(),
                actual: account.state,
            });
        }
        if !amount.is_valid() || !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(format!("invalid deposit {amount}")));
        }
        if amount.denom != account.balance.denom {
            return Err(LedgerError::DenomMismatch {
                expected: account.balance.denom.clone(),
                actual: amount.denom.clone(),
            });
        }
        if depositor != &account.owner && depositor != &account.depositor {
            return Err(LedgerError::InvalidAddress(format!(
                "{depositor} may not deposit into {id}"
            )));
        }

        self.bank
            .send_to_module(ctx, depositor, constants::ESCROW_MODULE_ACCOUNT, amount)?;
        if depositor == &account.owner {
            account.balance = account.balance.checked_add(amount)?;
        } else {
            account.funds = account.funds.checked_add(amount)?;
        }
        save(ctx, account_key(id), &account)?;
        ctx.emit(LedgerEvent::AccountDeposited {
            id: id.clone(),
            amount: amount.clone(),
        });
        debug!(account = %id, amount = %amount, "escrow account deposited");

        self.settle_account(ctx, id)
    }

    /// Accrue every Active payment up to the transaction height.
    ///
    /// A no-op for accounts that are not Open or were already settled at
    /// this height.
    ///
    /// # Errors
    /// `AccountNotFound`, or a fatal store/codec error.
    pub fn settle_account(&self, ctx: &mut TxContext<'_>, id: &AccountId) -> Result<Account> {
        let mut account = self.require_account(&*ctx, id)?;
        if account.state != AccountState::Open {
            return Ok(account);
        }
        let height = ctx.height();
        let elapsed = height.saturating_sub(account.settled_at);
        if elapsed == 0 {
            return Ok(account);
        }
        account.settled_at = height;

        let mut payments: Vec<Payment> = self
            .payments_for_account(&*ctx, id)?
            .into_iter()
            .filter(|p| p.state == PaymentState::Active)
            .collect();

        // Accrual clamps at the largest amount: a clamped debt exceeds any
        // balance, so it settles as an overdraft.
        let blocks = Decimal::from(elapsed);
        let owed: Vec<DecCoin> = payments
            .iter()
            .map(|p| p.rate.saturating_scaled(blocks))
            .collect();
        let total = owed
            .iter()
            .try_fold(DecCoin::zero(account.balance.denom.clone()), |acc, c| {
                acc.saturating_add(c)
            })?;
        let overdrawn = account.available()?.is_lt(&total)?;

        for (payment, due) in payments.iter_mut().zip(&owed) {
            let paid = due.clone().min(account.available()?);
            draw(&mut account, &paid)?;
            payment.balance = payment.balance.checked_add(&paid)?;
        }

        if !overdrawn {
            for payment in &payments {
                save(ctx, payment_key(id, &payment.payment_id), payment)?;
            }
            save(ctx, account_key(id), &account)?;
            debug!(account = %id, blocks = elapsed, accrued = %total, "escrow account settled");
            return Ok(account);
        }

        warn!(account = %id, owed = %total, "escrow account overdrawn");
        account.state = AccountState::Overdrawn;
        ctx.emit(LedgerEvent::AccountOverdrawn { id: id.clone() });
        for payment in &mut payments {
            payment.state = PaymentState::Overdrawn;
            self.pay_out(ctx, payment)?;
            save(ctx, payment_key(id, &payment.payment_id), &*payment)?;
            ctx.emit(LedgerEvent::PaymentClosed {
                account: id.clone(),
                payment: payment.payment_id.clone(),
            });
        }
        save(ctx, account_key(id), &account)?;

        for payment in payments {
            ctx.push_notice(EscrowNotice::PaymentClosed(payment));
        }
        ctx.push_notice(EscrowNotice::AccountClosed(account.clone()));
        Ok(account)
    }

    /// Close an account, returning `balance` to the owner and `funds` to the
    /// depositor. Closing a Closed account is a no-op.
    ///
    /// # Errors
    /// `PaymentsStillActive` if any payment is still Active.
    pub fn close_account(&self, ctx: &mut TxContext<'_>, id: &AccountId) -> Result<Account> {
        let mut account = self.settle_account(ctx, id)?;
        if account.state == AccountState::Closed {
            return Ok(account);
        }
        let active = self
            .payments_for_account(&*ctx, id)?
            .iter()
            .filter(|p| p.state == PaymentState::Active)
            .count();
        if active > 0 {
            return Err(LedgerError::PaymentsStillActive {
                id: id.clone(),
                active,
            });
        }

        let denom = account.balance.denom.clone();
        let to_owner = std::mem::replace(&mut account.balance, DecCoin::zero(denom.clone()));
        let to_depositor = std::mem::replace(&mut account.funds, DecCoin::zero(denom));
        self.bank.send_from_module(
            ctx,
            constants::ESCROW_MODULE_ACCOUNT,
            &account.owner,
            &to_owner,
        )?;
        self.bank.send_from_module(
            ctx,
            constants::ESCROW_MODULE_ACCOUNT,
            &account.depositor,
            &to_depositor,
        )?;
        account.state = AccountState::Closed;
        save(ctx, account_key(id), &account)?;
        ctx.emit(LedgerEvent::AccountClosed { id: id.clone() });
        info!(
            account = %id,
            owner_refund = %to_owner,
            depositor_refund = %to_depositor,
            "escrow account closed"
        );
        ctx.push_notice(EscrowNotice::AccountClosed(account.clone()));
        Ok(account)
    }

    // -----------------------------------------------------------------
    // Payments
    // -----------------------------------------------------------------

    /// Start a payment stream of `rate` per block to `payee`.
    ///
    /// # Errors
    /// - `AccountNotFound` / `AccountNotOpen` (including an account that
    ///   overdraws while settling)
    /// - `PaymentExists`
    /// - `DenomMismatch` if `rate` is not in the account's denomination
    pub fn create_payment(
        &self,
        ctx: &mut TxContext<'_>,
        account_id: &AccountId,
        payment_id: PaymentId,
        payee: &Address,
        rate: &DecCoin,
    ) -> Result<Payment> {
        let account = self.settle_account(ctx, account_id)?;
        if account.state != AccountState::Open {
            return Err(LedgerError::AccountNotOpen {
                id: account_id.clone(),
                actual: account.state,
            });
        }
        payee.validate()?;
        if !rate.is_valid() {
            return Err(LedgerError::InvalidAmount(format!("invalid rate {rate}")));
        }
        if rate.denom != account.balance.denom {
            return Err(LedgerError::DenomMismatch {
                expected: account.balance.denom,
                actual: rate.denom.clone(),
            });
        }
        let key = payment_key(account_id, &payment_id);
        if load::<Payment, _>(&*ctx, &key)?.is_some() {
            return Err(LedgerError::PaymentExists {
                account: account_id.clone(),
                payment: payment_id,
            });
        }

        let zero = DecCoin::zero(rate.denom.clone());
        let payment = Payment {
            account_id: account_id.clone(),
            payment_id,
            owner: payee.clone(),
            state: PaymentState::Active,
            rate: rate.clone(),
            balance: zero.clone(),
            withdrawn: zero,
        };
        save(ctx, key, &payment)?;
        ctx.emit(LedgerEvent::PaymentCreated {
            account: account_id.clone(),
            payment: payment.payment_id.clone(),
            rate: rate.clone(),
        });
        debug!(
            account = %account_id,
            payment = %payment.payment_id,
            rate = %rate,
            "escrow payment created"
        );
        Ok(payment)
    }

    /// Pay the accrued balance out to the payee. The stream stays as is.
    ///
    /// # Errors
    /// `AccountNotFound` / `PaymentNotFound`.
    pub fn withdraw_payment(
        &self,
        ctx: &mut TxContext<'_>,
        account_id: &AccountId,
        payment_id: &PaymentId,
    ) -> Result<Payment> {
        self.settle_account(ctx, account_id)?;
        let mut payment = self.require_payment(&*ctx, account_id, payment_id)?;
        if self.pay_out(ctx, &mut payment)?.is_some() {
            save(ctx, payment_key(account_id, payment_id), &payment)?;
        }
        Ok(payment)
    }

    /// Stop accrual, withdraw what is left and mark the payment Closed.
    /// Closing a Closed or Overdrawn payment is a no-op.
    ///
    /// # Errors
    /// `AccountNotFound` / `PaymentNotFound`.
    pub fn close_payment(
        &self,
        ctx: &mut TxContext<'_>,
        account_id: &AccountId,
        payment_id: &PaymentId,
    ) -> Result<Payment> {
        self.settle_account(ctx, account_id)?;
        let mut payment = self.require_payment(&*ctx, account_id, payment_id)?;
        if payment.state.is_terminal() {
            return Ok(payment);
        }
        self.pay_out(ctx, &mut payment)?;
        payment.state = PaymentState::Closed;
        save(ctx, payment_key(account_id, payment_id), &payment)?;
        ctx.emit(LedgerEvent::PaymentClosed {
            account: account_id.clone(),
            payment: payment_id.clone(),
        });
        debug!(
            account = %account_id,
            payment = %payment_id,
            withdrawn = %payment.withdrawn,
            "escrow payment closed"
        );
        ctx.push_notice(EscrowNotice::PaymentClosed(payment.clone()));
        Ok(payment)
    }

    /// Move the accrued balance of `payment` to its payee. The caller saves.
    fn pay_out(&self, ctx: &mut TxContext<'_>, payment: &mut Payment) -> Result<Option<DecCoin>> {
        if payment.balance.is_zero() {
            return Ok(None);
        }
        let amount = std::mem::replace(
            &mut payment.balance,
            DecCoin::zero(payment.rate.denom.clone()),
        );
        self.bank.send_from_module(
            ctx,
            constants::ESCROW_MODULE_ACCOUNT,
            &payment.owner,
            &amount,
        )?;
        payment.withdrawn = payment.withdrawn.checked_add(&amount)?;
        ctx.emit(LedgerEvent::PaymentWithdrawn {
            account: payment.account_id.clone(),
            payment: payment.payment_id.clone(),
            amount: amount.clone(),
        });
        Ok(Some(amount))
    }
}
