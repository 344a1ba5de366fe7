pub mod storage_gateway;
