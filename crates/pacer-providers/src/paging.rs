/// Page after `current`, or `None` when the source returned a short page.
pub(crate) fn next_page(current: u32, received: usize, per_page: u32) -> Option<u32> {
    if received == 0 || received < per_page as usize {
        None
    } else {
        current.checked_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_page_has_successor() {
        assert_eq!(next_page(1, 30, 30), Some(2));
    }

    #[test]
    fn short_or_empty_page_ends_listing() {
        assert_eq!(next_page(3, 12, 30), None);
        assert_eq!(next_page(3, 0, 30), None);
    }
}
