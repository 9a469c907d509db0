//! Contacts a user agent has overheard, and the matches found among them.

use crate::ephid::{EphemeralId, Geotag, Proof};
use crate::time::{Time, Timestamp, JITTER_THRESHOLD, MAX_CONTACTS_IN_WINDOW, T_WINDOW};

/// Received signal strength, in dBm
pub type Rssi = i16;

/// An overheard identifier, with what the receiver knew when it heard it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contact {
    /// The identifier that was received
    pub id: EphemeralId,
    /// Signal strength at reception, if the radio reported one
    pub rssi: Option<Rssi>,
    /// When it was received, by the receiver's clock
    pub time: Timestamp,
    /// Where the receiver was
    pub location: Geotag,
}

/// A contact that authenticated against a published key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Match {
    /// The matching contact
    pub contact: Contact,
    /// The geotag the broadcaster embedded
    pub infected_geotag: Geotag,
    /// The broadcaster's proof for the epoch
    pub proof: Proof,
    /// The broadcaster's (day, epoch, unit)
    pub other_time: Time,
    /// Start of the broadcaster's unit, in seconds; accurate to one unit
    pub infected_time: Timestamp,
}

/// Contact log with intake ordering and flood protection
#[derive(Debug, Default)]
pub(crate) struct ContactStore {
    /// Contacts in arrival order; ascending by time up to jitter
    contacts: Vec<Contact>,
}

impl ContactStore {
    /// Accept `contact` unless it arrives too far out of order or the window is full
    pub(crate) fn store(&mut self, contact: Contact) -> bool {
        if let Some(latest) = self.contacts.last() {
            if contact.time < latest.time.saturating_sub(JITTER_THRESHOLD) {
                log::debug!(
                    "rejecting contact at {}: more than {JITTER_THRESHOLD}s before latest \
                     contact at {}",
                    contact.time,
                    latest.time
                );
                return false;
            }
        }

        if let Some(oldest_in_window) = self
            .contacts
            .len()
            .checked_sub(MAX_CONTACTS_IN_WINDOW)
            .and_then(|i| self.contacts.get(i))
        {
            if contact.time.saturating_sub(oldest_in_window.time) < T_WINDOW {
                log::debug!(
                    "rejecting contact at {}: {MAX_CONTACTS_IN_WINDOW} contacts already \
                     accepted since {}",
                    contact.time,
                    oldest_in_window.time
                );
                return false;
            }
        }

        self.contacts.push(contact);
        true
    }

    /// Remove every contact equal to `contact`
    pub(crate) fn delete(&mut self, contact: &Contact) {
        self.contacts.retain(|c| c != contact);
    }

    /// Remove every contact received before `cutoff`
    pub(crate) fn delete_before(&mut self, cutoff: Timestamp) {
        self.contacts.retain(|c| c.time >= cutoff);
    }

    /// Put the contacts into ascending time order, keeping arrival order among equal times
    pub(crate) fn sort(&mut self) {
        self.contacts.sort_by_key(|c| c.time);
    }

    /// All contacts, in stored order
    pub(crate) fn as_slice(&self) -> &[Contact] {
        &self.contacts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(n: u8, time: Timestamp) -> Contact {
        Contact {
            id: EphemeralId::new([n; 16]),
            rssi: None,
            time,
            location: Geotag::new([0; 5]),
        }
    }

    #[test]
    fn accepts_in_order_contacts() {
        let mut store = ContactStore::default();

        assert!(store.store(contact(1, 1_000)));
        assert!(store.store(contact(2, 2_000)));
        assert_eq!(2, store.as_slice().len());
    }

    #[test]
    fn tolerates_jitter_but_not_more() {
        let mut store = ContactStore::default();

        assert!(store.store(contact(1, 10_000)));
        assert!(!store.store(contact(2, 10_000 - JITTER_THRESHOLD - 1)));
        assert!(store.store(contact(3, 10_000 - JITTER_THRESHOLD)));
        assert_eq!(2, store.as_slice().len());
    }

    #[test]
    fn jitter_is_relative_to_latest_arrival() {
        let mut store = ContactStore::default();

        assert!(store.store(contact(1, 10_000)));
        assert!(store.store(contact(2, 9_500)));
        // Far earlier than 10_000, but within jitter of the last contact stored
        assert!(store.store(contact(3, 8_950)));
        assert!(!store.store(contact(4, 8_349)));
    }

    #[test]
    fn rate_limits_a_flood() {
        let mut store = ContactStore::default();
        let start = 100 * 86_400;

        for i in 0..MAX_CONTACTS_IN_WINDOW {
            assert!(store.store(contact(1, start + (i as u64) / 4)));
        }

        assert!(!store.store(contact(2, start + T_WINDOW - 1)));
        assert!(store.store(contact(3, start + T_WINDOW)));
        assert_eq!(MAX_CONTACTS_IN_WINDOW + 1, store.as_slice().len());
    }

    #[test]
    fn delete_removes_every_equal_contact() {
        let mut store = ContactStore::default();
        store.store(contact(1, 1_000));
        store.store(contact(1, 1_000));
        store.store(contact(1, 1_001));

        store.delete(&contact(1, 1_000));

        assert_eq!(&[contact(1, 1_001)], store.as_slice());
    }

    #[test]
    fn equality_covers_every_field() {
        let a = contact(1, 1_000);
        let mut b = a.clone();
        b.rssi = Some(-60);
        let mut c = a.clone();
        c.location = Geotag::new([1; 5]);

        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn delete_before_keeps_the_cutoff_second() {
        let mut store = ContactStore::default();
        store.store(contact(1, 1_000));
        store.store(contact(2, 1_001));

        store.delete_before(1_001);

        assert_eq!(&[contact(2, 1_001)], store.as_slice());
    }

    #[test]
    fn sort_orders_by_time() {
        let mut store = ContactStore::default();
        store.store(contact(1, 1_500));
        store.store(contact(2, 1_000));
        store.store(contact(3, 1_200));

        store.sort();

        let times: Vec<_> = store.as_slice().iter().map(|c| c.time).collect();
        assert_eq!(vec![1_000, 1_200, 1_500], times);
    }
}
