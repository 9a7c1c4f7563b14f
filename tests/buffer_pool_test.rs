use anyhow::Result;

use granitedb::storage::buffer::BufferPoolError;

mod common;
use common::{create_parallel_buffer_pool, create_test_buffer_pool};

#[test]
fn test_new_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (page, page_id) = buffer_pool.new_page()?;
    assert!(page_id >= 0);

    {
        let page_guard = page.read();
        assert_eq!(page_guard.page_id, page_id);
        assert!(page_guard.data.iter().all(|&b| b == 0));
    }

    buffer_pool.unpin_page(page_id, false)?;
    Ok(())
}

#[test]
fn test_fetch_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (_, page_id) = buffer_pool.new_page()?;
    buffer_pool.unpin_page(page_id, false)?;

    let fetched_page = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = fetched_page.read();
        assert_eq!(page_guard.page_id, page_id);
    }

    buffer_pool.unpin_page(page_id, false)?;
    Ok(())
}

#[test]
fn test_page_modification() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (page, page_id) = buffer_pool.new_page()?;
    {
        let mut page_guard = page.write();
        let test_data = b"Test Data";
        page_guard.data[100..100 + test_data.len()].copy_from_slice(test_data);
    }
    buffer_pool.unpin_page(page_id, true)?;

    let fetched_page = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = fetched_page.read();
        assert_eq!(&page_guard.data[100..109], b"Test Data");
    }
    buffer_pool.unpin_page(page_id, false)?;

    Ok(())
}

/// Pool of 3: pin it full, observe exhaustion, then free one frame at a time.
#[test]
fn test_pin_fill_then_evict() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(3)?;

    let (_, p1) = buffer_pool.new_page()?;
    let (_, p2) = buffer_pool.new_page()?;
    let (_, p3) = buffer_pool.new_page()?;

    // every frame pinned: no new page
    assert!(matches!(
        buffer_pool.new_page(),
        Err(BufferPoolError::BufferPoolFull)
    ));

    // freeing one frame is not enough once the page is re-pinned
    buffer_pool.unpin_page(p1, false)?;
    let fetched = buffer_pool.fetch_page(p1)?;
    assert_eq!(fetched.read().page_id, p1);
    assert!(matches!(
        buffer_pool.new_page(),
        Err(BufferPoolError::BufferPoolFull)
    ));

    // now really free it; the next new page evicts the clean p1
    buffer_pool.unpin_page(p1, false)?;
    let (_, p4) = buffer_pool.new_page()?;
    assert_ne!(p4, p1);
    assert_ne!(p4, p2);
    assert_ne!(p4, p3);

    buffer_pool.unpin_page(p2, false)?;
    buffer_pool.unpin_page(p3, false)?;
    buffer_pool.unpin_page(p4, false)?;
    Ok(())
}

/// Pool of 1: eviction must write the dirty page out, and fetching it back
/// must return the written bytes.
#[test]
fn test_dirty_eviction_flushes() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(1)?;

    let (page, p1) = buffer_pool.new_page()?;
    {
        let mut page_guard = page.write();
        page_guard.data[0..11].copy_from_slice(b"written out");
    }
    buffer_pool.unpin_page(p1, true)?;

    // reusing the only frame forces the dirty write-back
    let (_, p2) = buffer_pool.new_page()?;
    buffer_pool.unpin_page(p2, false)?;

    let fetched = buffer_pool.fetch_page(p1)?;
    assert_eq!(&fetched.read().data[0..11], b"written out");
    buffer_pool.unpin_page(p1, false)?;

    Ok(())
}

#[test]
fn test_buffer_pool_eviction() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(3)?;

    let mut page_ids = Vec::new();
    for i in 0..5u8 {
        let (page, page_id) = buffer_pool.new_page()?;
        {
            let mut page_guard = page.write();
            page_guard.data[0] = i;
        }
        buffer_pool.unpin_page(page_id, true)?;
        page_ids.push(page_id);
    }

    // the first page was evicted; it comes back from disk intact
    let first_page = buffer_pool.fetch_page(page_ids[0])?;
    {
        let page_guard = first_page.read();
        assert_eq!(page_guard.page_id, page_ids[0]);
        assert_eq!(page_guard.data[0], 0);
    }
    buffer_pool.unpin_page(page_ids[0], false)?;

    Ok(())
}

#[test]
fn test_flush_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (page, page_id) = buffer_pool.new_page()?;
    {
        let mut page_guard = page.write();
        let test_data = b"Test Data For Flushing";
        page_guard.data[100..100 + test_data.len()].copy_from_slice(test_data);
    }
    buffer_pool.unpin_page(page_id, true)?;

    buffer_pool.flush_page(page_id)?;
    // flushing clears the dirty bit, so flushing again is a no-op
    buffer_pool.flush_page(page_id)?;

    let fetched_page = buffer_pool.fetch_page(page_id)?;
    {
        let page_guard = fetched_page.read();
        assert_eq!(&page_guard.data[100..122], b"Test Data For Flushing");
    }
    buffer_pool.unpin_page(page_id, false)?;

    // flushing an absent page fails
    assert!(matches!(
        buffer_pool.flush_page(9999),
        Err(BufferPoolError::PageNotFound(_))
    ));

    Ok(())
}

#[test]
fn test_flush_all_pages() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let mut page_ids = Vec::new();
    for i in 0..5u8 {
        let (page, page_id) = buffer_pool.new_page()?;
        {
            let mut page_guard = page.write();
            page_guard.data[7] = i;
        }
        buffer_pool.unpin_page(page_id, true)?;
        page_ids.push(page_id);
    }

    buffer_pool.flush_all_pages()?;

    for (i, &page_id) in page_ids.iter().enumerate() {
        let fetched_page = buffer_pool.fetch_page(page_id)?;
        assert_eq!(fetched_page.read().data[7], i as u8);
        buffer_pool.unpin_page(page_id, false)?;
    }

    Ok(())
}

#[test]
fn test_unpin_errors() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(4)?;

    assert!(matches!(
        buffer_pool.unpin_page(123, false),
        Err(BufferPoolError::PageNotFound(_))
    ));

    let (_, page_id) = buffer_pool.new_page()?;
    buffer_pool.unpin_page(page_id, false)?;
    assert!(matches!(
        buffer_pool.unpin_page(page_id, false),
        Err(BufferPoolError::PageNotPinned(_))
    ));

    Ok(())
}

#[test]
fn test_delete_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(4)?;

    let (_, page_id) = buffer_pool.new_page()?;

    // pinned pages cannot be deleted
    assert!(matches!(
        buffer_pool.delete_page(page_id),
        Err(BufferPoolError::PagePinned(_))
    ));

    buffer_pool.unpin_page(page_id, false)?;
    let free_before = buffer_pool.free_frame_count();
    buffer_pool.delete_page(page_id)?;

    assert_eq!(buffer_pool.free_frame_count(), free_before + 1);
    assert_eq!(buffer_pool.replacer_len(), 0);
    assert!(buffer_pool.disk_manager().is_deallocated(page_id));

    // deleting a page that is not resident succeeds trivially
    buffer_pool.delete_page(4321)?;

    Ok(())
}

/// BP1-BP3: pinned pages are never victim candidates, and every frame is
/// either free or mapped.
#[test]
fn test_bookkeeping_invariants() -> Result<()> {
    let pool_size = 5;
    let (buffer_pool, _temp_file) = create_test_buffer_pool(pool_size)?;

    let check = |pool: &granitedb::BufferPoolManager| {
        assert_eq!(
            pool.free_frame_count() + pool.resident_page_count(),
            pool_size
        );
    };

    check(&buffer_pool);

    let mut page_ids = Vec::new();
    for _ in 0..pool_size {
        let (_, page_id) = buffer_pool.new_page()?;
        page_ids.push(page_id);
        check(&buffer_pool);
    }

    // all pinned: nothing evictable
    assert_eq!(buffer_pool.replacer_len(), 0);

    for &page_id in &page_ids {
        buffer_pool.unpin_page(page_id, false)?;
    }
    assert_eq!(buffer_pool.replacer_len(), pool_size);

    // re-pinning removes the frame from the replacer again
    buffer_pool.fetch_page(page_ids[0])?;
    assert_eq!(buffer_pool.replacer_len(), pool_size - 1);
    assert_eq!(buffer_pool.pin_count(page_ids[0]), Some(1));
    buffer_pool.unpin_page(page_ids[0], false)?;

    check(&buffer_pool);
    Ok(())
}

#[test]
fn test_parallel_pool_routing() -> Result<()> {
    let num_instances = 4;
    let (pool, _temp_file) = create_parallel_buffer_pool(num_instances, 3)?;

    assert_eq!(pool.pool_size(), 12);
    assert_eq!(pool.num_instances(), num_instances);

    // allocation round-robins, so ids cover every residue class
    let mut residues = std::collections::HashSet::new();
    let mut page_ids = Vec::new();
    for i in 0..8u8 {
        let (page, page_id) = pool.new_page()?;
        {
            let mut guard = page.write();
            guard.data[0] = i;
        }
        residues.insert(page_id as usize % num_instances);
        page_ids.push(page_id);
        pool.unpin_page(page_id, true)?;
    }
    assert_eq!(residues.len(), num_instances);

    // each page is resident in exactly the instance its id routes to
    for &page_id in &page_ids {
        let instance = pool.instance_for(page_id);
        assert_eq!(instance.instance_index(), page_id as usize % num_instances);
    }

    pool.flush_all_pages()?;

    for (i, &page_id) in page_ids.iter().enumerate() {
        let page = pool.fetch_page(page_id)?;
        assert_eq!(page.read().data[0], i as u8);
        pool.unpin_page(page_id, false)?;
    }

    Ok(())
}

#[test]
fn test_parallel_pool_exhaustion() -> Result<()> {
    let (pool, _temp_file) = create_parallel_buffer_pool(2, 2)?;

    let mut page_ids = Vec::new();
    for _ in 0..4 {
        let (_, page_id) = pool.new_page()?;
        page_ids.push(page_id);
    }

    // every frame of every instance is pinned
    assert!(matches!(
        pool.new_page(),
        Err(BufferPoolError::BufferPoolFull)
    ));

    // freeing any one frame lets allocation succeed again
    pool.unpin_page(page_ids[0], false)?;
    let (_, page_id) = pool.new_page()?;
    pool.unpin_page(page_id, false)?;

    Ok(())
}
