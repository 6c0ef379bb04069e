use satfund_db_types::{
    traits::RefundJobDatabase,
    types::{RefundJobEntry, RefundJobStatus},
    DbError, DbResult,
};

use crate::{
    utils::{decode, get_decoded, put_encoded, to_db_error},
    SledBackend,
};

impl RefundJobDatabase for SledBackend {
    fn put_refund_job(&self, entry: RefundJobEntry) -> DbResult<u64> {
        let id = self.next_id()?;
        put_encoded(&self.refund_jobs_tree, &id.to_be_bytes(), &entry)?;
        Ok(id)
    }

    fn update_refund_job(&self, id: u64, entry: RefundJobEntry) -> DbResult<()> {
        let key = id.to_be_bytes();
        if !self
            .refund_jobs_tree
            .contains_key(key)
            .map_err(to_db_error)?
        {
            return Err(DbError::NonExistentEntry);
        }
        put_encoded(&self.refund_jobs_tree, &key, &entry)
    }

    fn get_refund_job(&self, id: u64) -> DbResult<Option<RefundJobEntry>> {
        get_decoded(&self.refund_jobs_tree, &id.to_be_bytes())
    }

    fn get_refund_jobs_by_status(
        &self,
        status: RefundJobStatus,
    ) -> DbResult<Vec<(u64, RefundJobEntry)>> {
        let mut jobs = Vec::new();
        for item in self.refund_jobs_tree.iter() {
            let (key, raw) = item.map_err(to_db_error)?;
            let entry: RefundJobEntry = decode(&raw)?;
            if entry.status != status {
                continue;
            }
            let id: [u8; 8] = key
                .as_ref()
                .try_into()
                .map_err(|_| DbError::CodecError(format!("bad refund job key {key:?}")))?;
            jobs.push((u64::from_be_bytes(id), entry));
        }
        Ok(jobs)
    }
}
