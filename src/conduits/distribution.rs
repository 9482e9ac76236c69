//! Even, round-robin splitting of an amount across several endpoints.

/// Round-robin positions of one network, carried between its passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundRobin {
    pub insert: usize,
    pub extract: usize,
}

/// Distributes `amount` across sinks with the given remaining `capacities`. Returns the share of
/// every sink and the amount that could not be placed.
///
/// Round robin distribution can be "fast forwarded":
/// 1. Every sink that still has room gets the same share until the smallest of them is full.
/// 2. This repeats until nothing more fits or nothing is left.
/// 3. On the last round, `leftover` units that don't divide evenly go one each to the first
///    `leftover` sinks in round robin order starting at `rr_index`, which then moves past the last
///    sink that received one.
pub fn distribute(mut amount: u64, capacities: &[u64], rr_index: &mut usize) -> (Vec<u64>, u64) {
    let mut shares = vec![0u64; capacities.len()];
    if capacities.is_empty() {
        return (shares, amount);
    }
    *rr_index %= capacities.len();
    let requested = amount;

    while amount > 0 {
        let open = capacities
            .iter()
            .zip(&shares)
            .map(|(capacity, share)| capacity - share)
            .filter(|&room| room > 0);
        let num_open = open.clone().count() as u64;
        let per_sink_room = open.min().unwrap_or(0);
        if per_sink_room == 0 {
            break;
        }

        let to_distribute = amount.min(per_sink_room.saturating_mul(num_open));
        let per_sink = to_distribute / num_open;
        let leftover = to_distribute % num_open;

        let start = *rr_index;
        let mut handed_extra = 0u64;
        for i in 0..capacities.len() {
            let index = (start + i) % capacities.len();
            if capacities[index] == shares[index] {
                continue;
            }

            let mut give = per_sink;
            if handed_extra < leftover {
                give += 1;
                handed_extra += 1;
                if handed_extra == leftover {
                    *rr_index = (index + 1) % capacities.len();
                }
            }
            shares[index] += give;
        }

        amount -= to_distribute;
    }

    debug_assert!(shares.iter().zip(capacities).all(|(share, cap)| share <= cap));
    debug_assert_eq!(shares.iter().sum::<u64>() + amount, requested);
    (shares, amount)
}

/// Takes `amount` from sources holding `available` each, as evenly as possible, returning what
/// is taken from each. Uneven remainders are taken in round robin order starting at `rr_index`.
/// Never takes more than a source holds; the sum of the result is `min(amount, sum(available))`.
pub fn drain(amount: u64, available: &[u64], rr_index: &mut usize) -> Vec<u64> {
    let (taken, _) = distribute(amount, available, rr_index);
    taken
}
