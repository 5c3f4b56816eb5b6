mod writer_lease;
