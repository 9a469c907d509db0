//! Testing overheard identifiers against published epoch values.
//!
//! For every contact the matcher tries each unit within [`JITTER_THRESHOLD`] of the receive time,
//! against every epoch value published for that unit's (day, epoch).  Turning an epoch value into
//! a (mask, MAC key) pair costs three block encryptions, and neighbouring contacts share most of
//! their window, so candidates are cached per unit.
//!
//! Contacts must be supplied in ascending time order.  That lets the cache forget any unit that
//! has fallen behind the earliest window still to be scanned, so it never holds more than one
//! window's worth of units however many keys are published.  The eviction only bounds memory:
//! with or without it, the same matches come out.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::marker::PhantomData;

use crate::ciphersuite::CipherSuite;
use crate::contact::{Contact, Match};
use crate::ephid::{open, unit_mask};
use crate::keys::{epoch_sub_keys, Key};
use crate::prf::Block;
use crate::server::PublishedKeys;
use crate::time::{Time, Timestamp, UnitKey, JITTER_THRESHOLD, T_UNIT};
use crate::Error;

/// A ready-to-test (mask, MAC key) pair for one unit and one published epoch value
#[derive(Debug)]
struct Candidate {
    /// Unit mask
    mask: Block,
    /// Identifier tagging key
    mac_key: Key,
}

/// Sliding window of per-unit candidates
#[derive(Debug)]
pub(crate) struct UnitKeyCache<'a, S: CipherSuite> {
    /// Where candidates come from
    published: &'a PublishedKeys,
    /// Candidates by unit, in time order
    units: BTreeMap<UnitKey, Vec<Candidate>>,
    /// Ciphersuite marker
    _suite: PhantomData<S>,
}

impl<'a, S: CipherSuite> UnitKeyCache<'a, S> {
    /// An empty cache over `published`
    pub(crate) fn new(published: &'a PublishedKeys) -> Self {
        UnitKeyCache {
            published,
            units: BTreeMap::new(),
            _suite: PhantomData,
        }
    }

    /// Forget every unit before the one `window_start` falls in
    fn evict_before(&mut self, window_start: Timestamp) {
        let kept = self
            .units
            .split_off(&Time::from_timestamp(window_start).unit_key());
        let evicted = std::mem::replace(&mut self.units, kept);

        if !evicted.is_empty() {
            log::trace!(
                "evicted matching candidates for {} units before time {window_start}",
                evicted.len()
            );
        }
    }

    /// Candidates for the unit `time` falls in, computing them on first use
    fn candidates(&mut self, time: &Time) -> Result<&[Candidate], Error> {
        let candidates = match self.units.entry(time.unit_key()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let published = self.published.get(time.day(), time.epoch());
                let mut fresh = Vec::with_capacity(published.len());

                for epoch_value in published {
                    let (enc, mac_key) = epoch_sub_keys::<S>(epoch_value, time)?;
                    fresh.push(Candidate {
                        mask: unit_mask::<S>(&enc, time.units())?,
                        mac_key,
                    });
                }

                e.insert(fresh)
            }
        };

        Ok(candidates.as_slice())
    }

    /// Number of units currently held
    #[cfg(test)]
    fn len(&self) -> usize {
        self.units.len()
    }
}

/// Find every contact that authenticates against a published epoch value
///
/// `contacts` must be in ascending time order.
pub(crate) fn find_matches<S: CipherSuite>(
    contacts: &[Contact],
    published: &PublishedKeys,
) -> Result<Vec<Match>, Error> {
    let mut cache = UnitKeyCache::<S>::new(published);
    let mut matches = Vec::new();

    for contact in contacts {
        let window_start = contact.time.saturating_sub(JITTER_THRESHOLD);
        let window_end = contact.time.saturating_add(JITTER_THRESHOLD);

        cache.evict_before(window_start);

        let mut ts = window_start;
        while ts <= window_end {
            let t = Time::from_timestamp(ts);

            for candidate in cache.candidates(&t)? {
                let opened = open::<S>(&candidate.mask, &candidate.mac_key, &contact.id)?;
                if let Some((geotag, proof)) = opened {
                    matches.push(Match {
                        contact: contact.clone(),
                        infected_geotag: geotag,
                        proof,
                        other_time: t,
                        infected_time: t.to_timestamp()?,
                    });
                }
            }

            ts = match ts.checked_add(T_UNIT) {
                Some(next) => next,
                None => break,
            };
        }
    }

    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aes128v1::CipherSuite as Suite;
    use crate::ephid::{EphemeralId, Geotag};
    use crate::time::T_DAY;

    fn contact(n: u8, time: Timestamp) -> Contact {
        Contact {
            id: EphemeralId::new([n; 16]),
            rssi: None,
            time,
            location: Geotag::new([0; 5]),
        }
    }

    fn busy_feed(day: u64) -> PublishedKeys {
        let mut feed = PublishedKeys::default();
        for epoch in 0..24 {
            for n in 0..3 {
                feed.insert(day, epoch, [epoch ^ n; 16]);
            }
        }
        feed
    }

    #[test]
    fn nothing_published_means_nothing_matches() {
        let contacts = [contact(1, 100 * T_DAY), contact(2, 100 * T_DAY + 50)];

        assert!(find_matches::<Suite>(&contacts, &PublishedKeys::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn random_identifiers_do_not_match() {
        let feed = busy_feed(100);
        let contacts: Vec<_> = (0..20)
            .map(|i| contact(i, 100 * T_DAY + u64::from(i) * 1_000))
            .collect();

        assert!(find_matches::<Suite>(&contacts, &feed).unwrap().is_empty());
    }

    #[test]
    fn cache_stays_within_one_window() {
        let feed = busy_feed(100);
        let mut cache = UnitKeyCache::<Suite>::new(&feed);
        let window_units = (2 * JITTER_THRESHOLD / T_UNIT + 1) as usize;

        for i in 0..200u64 {
            let time = 100 * T_DAY + i * 400;
            let window_start = time - JITTER_THRESHOLD;
            cache.evict_before(window_start);

            let mut ts = window_start;
            while ts <= time + JITTER_THRESHOLD {
                cache.candidates(&Time::from_timestamp(ts)).unwrap();
                ts += T_UNIT;
            }

            assert!(cache.len() <= window_units, "cache grew to {}", cache.len());
        }
    }

    #[test]
    fn cache_stays_bounded_across_many_days() {
        let mut feed = PublishedKeys::default();
        for day in 100..110 {
            for (d, epoch, values) in busy_feed(day).iter() {
                for v in values {
                    feed.insert(d, epoch, *v);
                }
            }
        }
        let mut cache = UnitKeyCache::<Suite>::new(&feed);
        let window_units = (2 * JITTER_THRESHOLD / T_UNIT + 1) as usize;
        let mut largest = 0;

        for i in 0..2_000u64 {
            let time = 100 * T_DAY + 1_000 + i * 400;
            let window_start = time - JITTER_THRESHOLD;
            cache.evict_before(window_start);

            let mut ts = window_start;
            while ts <= time + JITTER_THRESHOLD {
                cache.candidates(&Time::from_timestamp(ts)).unwrap();
                ts += T_UNIT;
            }

            largest = largest.max(cache.len());
        }

        assert!(largest <= window_units, "cache grew to {largest}");
    }

    #[test]
    fn candidates_cover_every_published_value() {
        let feed = busy_feed(100);
        let mut cache = UnitKeyCache::<Suite>::new(&feed);

        let t = Time::from_timestamp(100 * T_DAY + 5 * 3_600 + 2 * T_UNIT);

        assert_eq!(3, cache.candidates(&t).unwrap().len());
        assert!(cache
            .candidates(&Time::from_timestamp(101 * T_DAY))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn window_near_time_zero_does_not_underflow() {
        let contacts = [contact(1, 10)];

        assert!(find_matches::<Suite>(&contacts, &busy_feed(0))
            .unwrap()
            .is_empty());
    }
}
