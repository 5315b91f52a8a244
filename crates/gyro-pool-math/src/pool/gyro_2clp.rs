//! Stateful wrapper around the 2-CLP math for a two-token pool.

use {
    super::{
        PoolToken, Rounding, SwapKind, TokenAmount, TokenState, add_swap_fee_amount,
        apply_limit_factor, subtract_swap_fee_amount, validate_swap_fee,
    },
    crate::{
        error::Error,
        fixed_point::{WAD, div_down_fixed},
        gyro_2clp_math,
    },
    ethereum_types::{H160, U256},
    itertools::Itertools,
    num::BigInt,
    std::collections::HashMap,
};

/// A Gyroscope 2-CLP pool: two tokens with liquidity concentrated on the
/// price interval `[alpha, beta]`, held as the square roots of the bounds.
///
/// The bounds are quoted as the price of token 0 in units of token 1. Token
/// order is fixed at construction and drives the direction handling: when
/// token 1 is the input side, the interval is inverted before deriving the
/// invariant and virtual reserves.
#[derive(Clone, Debug)]
pub struct Gyro2CLPPool {
    address: H160,
    tokens: [PoolToken; 2],
    token_index: HashMap<H160, usize>,
    swap_fee: BigInt,
    sqrt_alpha: BigInt,
    sqrt_beta: BigInt,
}

impl Gyro2CLPPool {
    pub fn new(
        address: H160,
        tokens: [TokenState; 2],
        swap_fee: BigInt,
        sqrt_alpha: BigInt,
        sqrt_beta: BigInt,
    ) -> Result<Self, Error> {
        validate_swap_fee(&swap_fee)?;
        if sqrt_alpha <= BigInt::from(0) || sqrt_alpha >= sqrt_beta {
            return Err(Error::InvalidPoolParameters);
        }
        if !tokens.iter().map(|state| state.token).all_unique() {
            return Err(Error::InvalidPoolParameters);
        }

        let token_index = tokens
            .iter()
            .enumerate()
            .map(|(index, state)| (state.token, index))
            .collect();
        let tokens = [
            PoolToken::new(0, &tokens[0])?,
            PoolToken::new(1, &tokens[1])?,
        ];

        Ok(Self {
            address,
            tokens,
            token_index,
            swap_fee,
            sqrt_alpha,
            sqrt_beta,
        })
    }

    pub fn address(&self) -> H160 {
        self.address
    }

    pub fn tokens(&self) -> &[PoolToken; 2] {
        &self.tokens
    }

    pub fn swap_fee(&self) -> &BigInt {
        &self.swap_fee
    }

    /// Resolves a token pair to pool indices, in/out order preserved.
    fn token_pair(&self, token_in: &H160, token_out: &H160) -> Result<(usize, usize), Error> {
        let index_in = *self
            .token_index
            .get(token_in)
            .ok_or(Error::TokenNotRegistered)?;
        let index_out = *self
            .token_index
            .get(token_out)
            .ok_or(Error::TokenNotRegistered)?;
        if index_in == index_out {
            return Err(Error::TokenNotRegistered);
        }
        Ok((index_in, index_out))
    }

    /// Price bounds oriented for the given input side. A swap paying in
    /// token 1 trades on the inverted interval `[1/beta, 1/alpha]`.
    fn oriented_bounds(&self, index_in: usize) -> Result<(BigInt, BigInt), Error> {
        if index_in == 0 {
            Ok((self.sqrt_alpha.clone(), self.sqrt_beta.clone()))
        } else {
            Ok((
                div_down_fixed(&*WAD, &self.sqrt_beta)?,
                div_down_fixed(&*WAD, &self.sqrt_alpha)?,
            ))
        }
    }

    /// Derives the invariant from current balances and returns the virtual
    /// reserve offsets for the (in, out) orientation.
    fn virtual_offsets(&self, index_in: usize, index_out: usize) -> Result<(BigInt, BigInt), Error> {
        let (sqrt_alpha, sqrt_beta) = self.oriented_bounds(index_in)?;
        let invariant = gyro_2clp_math::calculate_invariant(
            [
                self.tokens[index_in].balance.scale18(),
                self.tokens[index_out].balance.scale18(),
            ],
            &sqrt_alpha,
            &sqrt_beta,
        )?;
        gyro_2clp_math::find_virtual_params(&invariant, &sqrt_alpha, &sqrt_beta)
    }

    /// Quotes the output for a fixed input amount in token-in native
    /// decimals. The pool is not modified.
    pub fn swap_given_in(
        &self,
        token_in: &H160,
        token_out: &H160,
        amount_in: U256,
    ) -> Result<TokenAmount, Error> {
        let (index_in, index_out) = self.token_pair(token_in, token_out)?;
        let token_in = &self.tokens[index_in];
        let token_out = &self.tokens[index_out];

        let amount_in = TokenAmount::from_raw_amount(amount_in, token_in.balance.decimals())?;
        let in_less_fee = subtract_swap_fee_amount(&amount_in, &self.swap_fee)?;

        let (virtual_in, virtual_out) = self.virtual_offsets(index_in, index_out)?;
        let out_scale18 = gyro_2clp_math::calc_out_given_in(
            token_in.balance.scale18(),
            token_out.balance.scale18(),
            in_less_fee.scale18(),
            &virtual_in,
            &virtual_out,
        )?;

        TokenAmount::from_scale18_amount(
            out_scale18,
            token_out.balance.decimals(),
            Rounding::RoundDown,
        )
    }

    /// Like [`Self::swap_given_in`], but also applies the swap to the held
    /// balances so follow-up quotes see the post-swap state.
    pub fn swap_given_in_mut(
        &mut self,
        token_in: &H160,
        token_out: &H160,
        amount_in: U256,
    ) -> Result<TokenAmount, Error> {
        let amount_out = self.swap_given_in(token_in, token_out, amount_in)?;
        let (index_in, index_out) = self.token_pair(token_in, token_out)?;
        self.tokens[index_in].balance.increase(amount_in)?;
        self.tokens[index_out].balance.decrease(amount_out.amount())?;
        tracing::trace!(
            pool = ?self.address,
            ?amount_in,
            amount_out = ?amount_out.amount(),
            "applied 2-CLP swap to pool balances"
        );
        Ok(amount_out)
    }

    /// Quotes the input required for a fixed output amount in token-out
    /// native decimals, fee included. The pool is not modified.
    pub fn swap_given_out(
        &self,
        token_in: &H160,
        token_out: &H160,
        amount_out: U256,
    ) -> Result<TokenAmount, Error> {
        let (index_in, index_out) = self.token_pair(token_in, token_out)?;
        let token_in = &self.tokens[index_in];
        let token_out = &self.tokens[index_out];

        let amount_out = TokenAmount::from_raw_amount(amount_out, token_out.balance.decimals())?;

        let (virtual_in, virtual_out) = self.virtual_offsets(index_in, index_out)?;
        let in_scale18 = gyro_2clp_math::calc_in_given_out(
            token_in.balance.scale18(),
            token_out.balance.scale18(),
            amount_out.scale18(),
            &virtual_in,
            &virtual_out,
        )?;

        let in_less_fee = TokenAmount::from_scale18_amount(
            in_scale18,
            token_in.balance.decimals(),
            Rounding::RoundUp,
        )?;
        add_swap_fee_amount(&in_less_fee, &self.swap_fee)
    }

    /// Like [`Self::swap_given_out`], but also applies the swap to the held
    /// balances.
    pub fn swap_given_out_mut(
        &mut self,
        token_in: &H160,
        token_out: &H160,
        amount_out: U256,
    ) -> Result<TokenAmount, Error> {
        let amount_in = self.swap_given_out(token_in, token_out, amount_out)?;
        let (index_in, index_out) = self.token_pair(token_in, token_out)?;
        self.tokens[index_in].balance.increase(amount_in.amount())?;
        self.tokens[index_out].balance.decrease(amount_out)?;
        tracing::trace!(
            pool = ?self.address,
            amount_in = ?amount_in.amount(),
            ?amount_out,
            "applied 2-CLP swap to pool balances"
        );
        Ok(amount_in)
    }

    /// The largest swap amount the pool supports in the given direction,
    /// 18-decimal scaled and reduced by the swap limit safety factor.
    pub fn get_limit_amount_swap(
        &self,
        token_in: &H160,
        token_out: &H160,
        kind: SwapKind,
    ) -> Result<BigInt, Error> {
        let (index_in, index_out) = self.token_pair(token_in, token_out)?;
        match kind {
            SwapKind::GivenIn => {
                let (sqrt_alpha, sqrt_beta) = self.oriented_bounds(index_in)?;
                let invariant = gyro_2clp_math::calculate_invariant(
                    [
                        self.tokens[index_in].balance.scale18(),
                        self.tokens[index_out].balance.scale18(),
                    ],
                    &sqrt_alpha,
                    &sqrt_beta,
                )?;
                // Real in-side reserves run out at x_max = L/sqrtAlpha -
                // L/sqrtBeta.
                let max_balance_in = div_down_fixed(&invariant, &sqrt_alpha)?
                    - div_down_fixed(&invariant, &sqrt_beta)?;
                let headroom = max_balance_in - self.tokens[index_in].balance.scale18();
                Ok(apply_limit_factor(&headroom))
            }
            SwapKind::GivenOut => Ok(apply_limit_factor(
                self.tokens[index_out].balance.scale18(),
            )),
        }
    }

    /// Half the effective out-side reserve, used to rank pools by depth.
    pub fn get_normalized_liquidity(
        &self,
        token_in: &H160,
        token_out: &H160,
    ) -> Result<BigInt, Error> {
        let (index_in, index_out) = self.token_pair(token_in, token_out)?;
        let (_, virtual_out) = self.virtual_offsets(index_in, index_out)?;
        Ok((self.tokens[index_out].balance.scale18() + virtual_out) / 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wei(s: &str) -> BigInt {
        s.parse().unwrap()
    }

    fn usdc() -> H160 {
        H160::from_low_u64_be(1)
    }

    fn dai() -> H160 {
        H160::from_low_u64_be(2)
    }

    /// USDC (6 decimals) / DAI pool with bounds close around 1.0 and a 0.9%
    /// swap fee.
    fn test_pool() -> Gyro2CLPPool {
        Gyro2CLPPool::new(
            H160::from_low_u64_be(0xbeef),
            [
                TokenState {
                    token: usdc(),
                    decimals: 6,
                    balance: U256::from(1_100_000_000_000_u64),
                },
                TokenState {
                    token: dai(),
                    decimals: 18,
                    balance: U256::from(1_120_000_u64) * U256::exp10(18),
                },
            ],
            BigInt::from(9_000_000_000_000_000_u64),
            wei("999500374750171757"),
            wei("1000500375350272092"),
        )
        .unwrap()
    }

    #[test]
    fn construction_rejects_bad_parameters() {
        let states = test_pool().tokens.clone();
        let state = |token: &PoolToken| TokenState {
            token: token.token,
            decimals: token.balance.decimals(),
            balance: token.balance.amount(),
        };

        // Inverted bounds.
        assert_eq!(
            Gyro2CLPPool::new(
                H160::zero(),
                [state(&states[0]), state(&states[1])],
                BigInt::from(0),
                wei("1000500375350272092"),
                wei("999500374750171757"),
            )
            .err(),
            Some(Error::InvalidPoolParameters)
        );

        // Duplicate token.
        assert_eq!(
            Gyro2CLPPool::new(
                H160::zero(),
                [state(&states[0]), state(&states[0])],
                BigInt::from(0),
                wei("999500374750171757"),
                wei("1000500375350272092"),
            )
            .err(),
            Some(Error::InvalidPoolParameters)
        );

        // Fee above 100%.
        assert_eq!(
            Gyro2CLPPool::new(
                H160::zero(),
                [state(&states[0]), state(&states[1])],
                &*WAD + 1,
                wei("999500374750171757"),
                wei("1000500375350272092"),
            )
            .err(),
            Some(Error::InvalidPoolParameters)
        );
    }

    #[test]
    fn swap_given_in_reference_case() {
        let pool = test_pool();

        // 10,000 USDC in at a 0.9% fee.
        let out = pool
            .swap_given_in(&usdc(), &dai(), U256::from(10_000_000_000_u64))
            .unwrap();
        assert_eq!(out.scale18(), &wei("9910049983682541260800"));
    }

    #[test]
    fn swap_given_in_inverted_direction() {
        let pool = test_pool();

        // 10,000 DAI in; the price interval flips to [1/beta, 1/alpha].
        let out = pool
            .swap_given_in(&dai(), &usdc(), U256::from(10_000_u64) * U256::exp10(18))
            .unwrap();
        assert_eq!(out.amount(), U256::from(9_909_861_563_u64));
    }

    #[test]
    fn swap_given_out_reference_case() {
        let pool = test_pool();

        // 10,000 DAI out; input grossed up by the fee.
        let amount_in = pool
            .swap_given_out(&usdc(), &dai(), U256::from(10_000_u64) * U256::exp10(18))
            .unwrap();
        assert_eq!(amount_in.amount(), U256::from(10_090_766_870_u64));
    }

    #[test]
    fn swap_round_trip_never_favors_trader() {
        let pool = test_pool();
        let amount_in = U256::from(10_000_000_000_u64);

        let out = pool.swap_given_in(&usdc(), &dai(), amount_in).unwrap();
        let back_in = pool.swap_given_out(&usdc(), &dai(), out.amount()).unwrap();
        assert!(back_in.amount() <= amount_in);
    }

    #[test]
    fn mut_swap_updates_balances() {
        let mut pool = test_pool();
        let out = pool
            .swap_given_in_mut(&usdc(), &dai(), U256::from(10_000_000_000_u64))
            .unwrap();

        assert_eq!(
            pool.tokens[0].balance.amount(),
            U256::from(1_110_000_000_000_u64)
        );
        assert_eq!(
            pool.tokens[1].balance.amount(),
            U256::from(1_120_000_u64) * U256::exp10(18) - out.amount()
        );

        // A second identical swap now quotes less.
        let second = pool
            .swap_given_in(&usdc(), &dai(), U256::from(10_000_000_000_u64))
            .unwrap();
        assert!(second.scale18() < out.scale18());
    }

    #[test]
    fn limit_amounts() {
        let pool = test_pool();

        assert_eq!(
            pool.get_limit_amount_swap(&usdc(), &dai(), SwapKind::GivenIn)
                .unwrap(),
            wei("1120553413095180462347740")
        );
        assert_eq!(
            pool.get_limit_amount_swap(&usdc(), &dai(), SwapKind::GivenOut)
                .unwrap(),
            wei("1119998880000000000000000")
        );
    }

    #[test]
    fn normalized_liquidity_reference_case() {
        let pool = test_pool();
        assert_eq!(
            pool.get_normalized_liquidity(&usdc(), &dai()).unwrap(),
            wei("1110282433295797151876168197")
        );
    }

    #[test]
    fn unknown_token_is_rejected() {
        let pool = test_pool();
        let stranger = H160::from_low_u64_be(99);
        assert_eq!(
            pool.swap_given_in(&stranger, &dai(), U256::one()),
            Err(Error::TokenNotRegistered)
        );
        assert_eq!(
            pool.swap_given_in(&usdc(), &usdc(), U256::one()),
            Err(Error::TokenNotRegistered)
        );
    }
}
