//! Contains constants and other configuration information affecting default & fixed behaviors of this library

use std::ops::RangeInclusive;
use std::time::Duration;
use strum_macros::FromRepr;


/// Specifies the channels (queues) from `reactive-mutiny` that may buffer each merged source's items.\
/// On different hardware, the performance characteristics may vary.
#[derive(Debug,PartialEq,FromRepr)]
pub enum Channels {
    Atomic,
    FullSync,
    Crossbeam,
}

/// Specifies how to behave when a source produces faster than the merged output is being
/// consumed -- filling up that source's buffer
#[derive(Debug,PartialEq)]
pub enum RetryingStrategies {

    /// Simply drop items facing "buffer is full" denials, without retrying nor ending the source.\
    /// This option is acceptable when missing items don't disrupt the merged output and when
    /// low latencies / realtime-ish behavior is required.\
    /// Set [ConstConfig::source_buffer] accordingly.
    DoNotRetry,

    /// Ends the source on "buffer is full" errors, also without retrying -- the merged output
    /// will see that source as if it had completed at the last successfully relayed item
    EndSource,

    /// Retries, in case of "buffer is full" errors, ending the source if success still can't
    /// be achieved after the given number of attempts -- the sleeping times between attempts
    /// follow an exponential backoff with jitter
    RetryWithBackoffUpTo(u8),

    /// Retries, in case of "buffer is full" errors, ending the source if success still can't
    /// be achieved during the specified milliseconds -- during which retrying will be performed
    /// in a pool loop, yielding to tokio before each attempt.\
    /// Use this option if low latency is desirable -- but see also [Self::RetryWithBackoffUpTo]
    RetryYieldingForUpToMillis(u8),
}
impl RetryingStrategies {
    /// requires 2+8=10 bits to represent the data; reverse of [Self::from_repr()]
    const fn as_repr(&self) -> u16 {
        match self {
            Self::DoNotRetry                           => 0,
            Self::EndSource                            => 1,
            Self::RetryWithBackoffUpTo(n)        => 2 | (*n as u16) << 2,
            Self::RetryYieldingForUpToMillis(n)  => 3 | (*n as u16) << 2,
        }
    }
    /// reverse of [Self::as_repr()]
    const fn from_repr(repr: u16) -> Self {
        let (variant, n) = (repr & 3, repr >> 2);
        match variant {
            0 => Self::DoNotRetry,
            1 => Self::EndSource,
            2 => Self::RetryWithBackoffUpTo(n as u8),
            3 => Self::RetryYieldingForUpToMillis(n as u8),
            _ => unreachable!(),    // If this errors, did a new enum member was added?
        }
    }
}


/// Implements something that could be called the "Zero-Cost Const Configuration Pattern", that produces a `u64`
/// whose goal is to be the only const parameter of a generic struct (avoiding the alternative of bloating it with several const params).\
/// When using the const "query functions" defined here in `if`s, the compiler will have the opportunity to cancel out any unreachable code (zero-cost abstraction).\
/// Usage example:
/// ```nocompile
///     const CONFIG: ConstConfig = ConstConfig {
///         source_buffer: 2048,
///         ..ConstConfig::default()
///     };
///     let mut merge = new_sequential_merge!(CONFIG, "my merge", String);
#[derive(Debug,PartialEq)]
pub struct ConstConfig {
    /// How many items each source may have buffered (power of 2)
    /// before [Self::retrying_strategy] starts being applied
    pub source_buffer: u32,
    /// How many milliseconds (power of 2) to wait for an ended source's remaining buffered
    /// items to be consumed by the merged output before its buffer is closed for good
    pub flush_timeout_millis: u16,
    /// Specifies what to do when a source's buffer is full
    pub retrying_strategy: RetryingStrategies,
    /// Allows changing the backing queue for the sources' buffers
    pub channel: Channels,
}

impl ConstConfig {

    // the consts here determine what bits they use
    // and may also specify ranges for stored data (rather than just flags)

    /// u32_value = 2^n
    const SOURCE_BUFFER: RangeInclusive<usize> = 0..=4;
    /// u16_value = 2^n
    const FLUSH_TIMEOUT_MILLIS: RangeInclusive<usize> = 5..=8;
    /// One of [RetryingStrategies], converted by [RetryingStrategies::as_repr()]
    const RETRYING_STRATEGY: RangeInclusive<usize> = 9..=18;
    /// One of [Channels]
    const CHANNEL: RangeInclusive<usize> = 19..=21;


    /// Contains sane & performant defaults.\
    /// Usage example:
    /// ```nocompile
    ///  const CONFIG: ConstConfig = ConstConfig {
    ///     source_buffer: 1024,
    ///     ..ConstConfig::default()
    /// };
    pub const fn default() -> ConstConfig {
        ConstConfig {
            source_buffer:        1024,
            flush_timeout_millis: 256,
            retrying_strategy:    RetryingStrategies::RetryWithBackoffUpTo(10),
            channel:              Channels::Atomic,
        }
    }

    /// For use when instantiating a generic struct that uses the "Const Config Pattern"
    /// -- when chosing a pre-defined configuration.\
    /// See also the `new_*_sequential_merge!()` macros, which do this dance for you.
    pub const fn into(self) -> u64 {
        let mut config = 0u64;
        config = set_bits_from_power_of_2_u32(config, Self::SOURCE_BUFFER,        self.source_buffer);
        config = set_bits_from_power_of_2_u16(config, Self::FLUSH_TIMEOUT_MILLIS, self.flush_timeout_millis);
        let retrying_strategy_repr = self.retrying_strategy.as_repr();
        config = set_bits(config, Self::RETRYING_STRATEGY, retrying_strategy_repr as u64);
        let channel_repr = self.channel as u8;
        config = set_bits(config, Self::CHANNEL, channel_repr as u64);
        config
    }

    /// Builds [Self] from the generic `const CONFIG: u64` parameter used in structs
    /// by the "Const Config Pattern"
    pub const fn from(config: u64) -> Self {
        let source_buffer          = get_power_of_2_u32_bits(config, Self::SOURCE_BUFFER);
        let flush_timeout_millis   = get_power_of_2_u16_bits(config, Self::FLUSH_TIMEOUT_MILLIS);
        let retrying_strategy_repr = get_bits(config, Self::RETRYING_STRATEGY);
        let channel_repr           = get_bits(config, Self::CHANNEL);
        Self {
            source_buffer,
            flush_timeout_millis,
            retrying_strategy: RetryingStrategies::from_repr(retrying_strategy_repr as u16),
            channel:           if let Some(channel) = Channels::from_repr(channel_repr as usize) {channel} else {Channels::Atomic},
        }
    }

    // query functions for business logic configuration attributes
    //////////////////////////////////////////////////////////////
    // to be used by the struct in which the generic `const CONFIG: u64` resides

    pub const fn extract_source_buffer(config: u64) -> u32 {
        let config = Self::from(config);
        config.source_buffer
    }

    pub const fn extract_flush_timeout(config: u64) -> Duration {
        let config = Self::from(config);
        Duration::from_millis(config.flush_timeout_millis as u64)
    }

    pub const fn extract_retrying_strategy(config: u64) -> RetryingStrategies {
        let config = Self::from(config);
        config.retrying_strategy
    }
}

/// Helper for retrieving data (other than simple flags) from the configuration
/// -- as stored in the specified `bits` by [set_bits()]
const fn get_bits(config: u64, bits: RangeInclusive<usize>) -> u64 {
    let bits_len = *bits.end()-*bits.start()+1;
    (config>>*bits.start()) & ((1<<bits_len)-1)
}

/// Helper for storing data (other than simple flags) in the configuration
/// -- stored in the specified `bits`.\
/// `value` should not be higher than what fits in the bits.\
/// Returns the `config` with the `value` applied to it in a way it may be retrieved by [get_bits()]
const fn set_bits(mut config: u64, bits: RangeInclusive<usize>, value: u64) -> u64 {
    let bits_len = *bits.end()-*bits.start()+1;
    if value > (1<<bits_len)-1 {
        // "The value specified is above the maximum the reserved bits for it can take"
        unreachable!();
    } else {
        config &= !( ((1<<bits_len)-1) << *bits.start() );   // clear the target bits
        config |= value << *bits.start();                    // set them
        config
    }
}

/// Retrieves 5 `bits` from `config` that represents a power of 2 over the `u32` space
const fn get_power_of_2_u32_bits(config: u64, bits: RangeInclusive<usize>) -> u32 {
    let value = get_bits(config, bits);
    1 << value
}

/// Packs, optimally, the `power_of_2_u32_value` into 5 `bits`, returning the new value for the given `config`
const fn set_bits_from_power_of_2_u32(config: u64, bits: RangeInclusive<usize>, power_of_2_u32_value: u32) -> u64 {
    if power_of_2_u32_value.is_power_of_two() {
        set_bits(config, bits, power_of_2_u32_value.ilog2() as u64)
    } else {
        // "The value must be a power of 2"
        unreachable!();
    }
}

/// Retrieves 4 `bits` from `config` that represents a power of 2 over the `u16` space
const fn get_power_of_2_u16_bits(config: u64, bits: RangeInclusive<usize>) -> u16 {
    let value = get_bits(config, bits);
    1 << value
}

/// Packs, optimally, the `power_of_2_u16_value` into 4 `bits`, returning the new value for the given `config`
const fn set_bits_from_power_of_2_u16(config: u64, bits: RangeInclusive<usize>, power_of_2_u16_value: u16) -> u64 {
    if power_of_2_u16_value.is_power_of_two() {
        set_bits(config, bits, power_of_2_u16_value.ilog2() as u64)
    } else {
        // "The value must be a power of 2"
        unreachable!();
    }
}


/// Unit tests & enforces the requisites of the [config](self) module
#[cfg(any(test,doc))]
mod tests {
    use super::*;

    #[cfg_attr(not(doc),test)]
    fn retrying_strategies_repr() {
        let subjects = vec![
            vec![
                RetryingStrategies::DoNotRetry,
                RetryingStrategies::EndSource,
            ].into_iter(),
            (0..8).map(|n| RetryingStrategies::RetryWithBackoffUpTo(1<<n)).collect::<Vec<_>>().into_iter(),
            (0..8).map(|n| RetryingStrategies::RetryYieldingForUpToMillis(1<<n)).collect::<Vec<_>>().into_iter(),
        ].into_iter().flatten();

        for expected in subjects {
            let converted = RetryingStrategies::as_repr(&expected);
            let reconverted = RetryingStrategies::from_repr(converted);
            assert_eq!(reconverted, expected, "FAILED: {:?} (repr: 0x{:x}); reconverted: {:?}", expected, converted, reconverted);
        }
    }

    #[cfg_attr(not(doc),test)]
    fn const_config() {
        let expected = || ConstConfig {
            source_buffer:        2048,
            flush_timeout_millis: 128,
            retrying_strategy:    RetryingStrategies::RetryWithBackoffUpTo(14),
            channel:              Channels::Crossbeam,
        };
        let converted = ConstConfig::into(expected());
        let reconverted = ConstConfig::from(converted);
        assert_eq!(reconverted, expected(), "FAILED: {:?} (repr: 0x{:x}); reconverted: {:?}", expected(), converted, reconverted);
    }

    /// `extract_*` queries must agree with the full [ConstConfig::from()] reconstruction
    #[cfg_attr(not(doc),test)]
    fn extraction_queries() {
        const CONFIG: ConstConfig = ConstConfig {
            source_buffer:        4,
            flush_timeout_millis: 512,
            retrying_strategy:    RetryingStrategies::RetryYieldingForUpToMillis(100),
            channel:              Channels::FullSync,
        };
        const CONFIG_U64: u64 = CONFIG.into();
        assert_eq!(ConstConfig::extract_source_buffer(CONFIG_U64), 4,                                                    "Wrong `source_buffer` extraction");
        assert_eq!(ConstConfig::extract_flush_timeout(CONFIG_U64), Duration::from_millis(512),                           "Wrong `flush_timeout` extraction");
        assert_eq!(ConstConfig::extract_retrying_strategy(CONFIG_U64), RetryingStrategies::RetryYieldingForUpToMillis(100), "Wrong `retrying_strategy` extraction");
    }

}
