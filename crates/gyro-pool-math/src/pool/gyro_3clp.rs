//! Stateful wrapper around the 3-CLP math for a three-token pool.

use {
    super::{
        PoolToken, Rounding, SwapKind, TokenAmount, TokenState, add_swap_fee_amount,
        apply_limit_factor, subtract_swap_fee_amount, validate_swap_fee,
    },
    crate::{
        error::Error,
        fixed_point::{WAD, div_down_fixed, mul_down_fixed},
        gyro_3clp_math,
    },
    ethereum_types::{H160, U256},
    itertools::Itertools,
    num::BigInt,
    std::collections::HashMap,
};

/// A Gyroscope 3-CLP pool: three tokens with liquidity concentrated on the
/// symmetric price range `[alpha, 1/alpha]` for every pair, held as the cube
/// root of alpha.
///
/// Any pairwise swap reduces to a constant-product trade on virtual reserves
/// offset by `L * root3_alpha` on both sides; the third token's balance
/// enters only through the invariant.
#[derive(Clone, Debug)]
pub struct Gyro3CLPPool {
    address: H160,
    tokens: [PoolToken; 3],
    token_index: HashMap<H160, usize>,
    swap_fee: BigInt,
    root3_alpha: BigInt,
}

impl Gyro3CLPPool {
    pub fn new(
        address: H160,
        tokens: [TokenState; 3],
        swap_fee: BigInt,
        root3_alpha: BigInt,
    ) -> Result<Self, Error> {
        validate_swap_fee(&swap_fee)?;
        if root3_alpha <= BigInt::from(0) || root3_alpha >= *WAD {
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
            PoolToken::new(2, &tokens[2])?,
        ];

        Ok(Self {
            address,
            tokens,
            token_index,
            swap_fee,
            root3_alpha,
        })
    }

    pub fn address(&self) -> H160 {
        self.address
    }

    pub fn tokens(&self) -> &[PoolToken; 3] {
        &self.tokens
    }

    pub fn swap_fee(&self) -> &BigInt {
        &self.swap_fee
    }

    /// Resolves a token pair to the (in, out, third) pool indices.
    fn token_triple(
        &self,
        token_in: &H160,
        token_out: &H160,
    ) -> Result<(usize, usize, usize), Error> {
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
        let index_third = 3 - index_in - index_out;
        Ok((index_in, index_out, index_third))
    }

    /// Derives the invariant from current balances and returns the shared
    /// virtual reserve offset `L * root3_alpha`.
    fn virtual_offset(&self, indices: (usize, usize, usize)) -> Result<BigInt, Error> {
        let invariant = self.invariant(indices)?;
        Ok(mul_down_fixed(&invariant, &self.root3_alpha))
    }

    fn invariant(&self, (index_in, index_out, index_third): (usize, usize, usize)) -> Result<BigInt, Error> {
        gyro_3clp_math::calculate_invariant(
            [
                self.tokens[index_in].balance.scale18(),
                self.tokens[index_out].balance.scale18(),
                self.tokens[index_third].balance.scale18(),
            ],
            &self.root3_alpha,
        )
    }

    /// Quotes the output for a fixed input amount in token-in native
    /// decimals. The pool is not modified.
    pub fn swap_given_in(
        &self,
        token_in: &H160,
        token_out: &H160,
        amount_in: U256,
    ) -> Result<TokenAmount, Error> {
        let indices = self.token_triple(token_in, token_out)?;
        let token_in = &self.tokens[indices.0];
        let token_out = &self.tokens[indices.1];

        let amount_in = TokenAmount::from_raw_amount(amount_in, token_in.balance.decimals())?;
        let in_less_fee = subtract_swap_fee_amount(&amount_in, &self.swap_fee)?;

        let virtual_offset = self.virtual_offset(indices)?;
        let out_scale18 = gyro_3clp_math::calc_out_given_in(
            token_in.balance.scale18(),
            token_out.balance.scale18(),
            in_less_fee.scale18(),
            &virtual_offset,
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
        let (index_in, index_out, _) = self.token_triple(token_in, token_out)?;
        self.tokens[index_in].balance.increase(amount_in)?;
        self.tokens[index_out].balance.decrease(amount_out.amount())?;
        tracing::trace!(
            pool = ?self.address,
            ?amount_in,
            amount_out = ?amount_out.amount(),
            "applied 3-CLP swap to pool balances"
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
        let indices = self.token_triple(token_in, token_out)?;
        let token_in = &self.tokens[indices.0];
        let token_out = &self.tokens[indices.1];

        let amount_out = TokenAmount::from_raw_amount(amount_out, token_out.balance.decimals())?;

        let virtual_offset = self.virtual_offset(indices)?;
        let in_scale18 = gyro_3clp_math::calc_in_given_out(
            token_in.balance.scale18(),
            token_out.balance.scale18(),
            amount_out.scale18(),
            &virtual_offset,
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
        let (index_in, index_out, _) = self.token_triple(token_in, token_out)?;
        self.tokens[index_in].balance.increase(amount_in.amount())?;
        self.tokens[index_out].balance.decrease(amount_out)?;
        tracing::trace!(
            pool = ?self.address,
            amount_in = ?amount_in.amount(),
            ?amount_out,
            "applied 3-CLP swap to pool balances"
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
        let indices = self.token_triple(token_in, token_out)?;
        match kind {
            SwapKind::GivenIn => {
                let invariant = self.invariant(indices)?;
                // Real in-side reserves run out at x_max = L/r^2 - L*r.
                let r_squared = mul_down_fixed(&self.root3_alpha, &self.root3_alpha);
                let max_balance_in = div_down_fixed(&invariant, &r_squared)?
                    - mul_down_fixed(&invariant, &self.root3_alpha);
                let headroom = max_balance_in - self.tokens[indices.0].balance.scale18();
                Ok(apply_limit_factor(&headroom))
            }
            SwapKind::GivenOut => Ok(apply_limit_factor(
                self.tokens[indices.1].balance.scale18(),
            )),
        }
    }

    /// Half the effective out-side reserve, used to rank pools by depth.
    pub fn get_normalized_liquidity(
        &self,
        token_in: &H160,
        token_out: &H160,
    ) -> Result<BigInt, Error> {
        let indices = self.token_triple(token_in, token_out)?;
        let virtual_offset = self.virtual_offset(indices)?;
        Ok(gyro_3clp_math::get_normalized_liquidity(
            self.tokens[indices.1].balance.scale18(),
            &virtual_offset,
        ))
    }
}
