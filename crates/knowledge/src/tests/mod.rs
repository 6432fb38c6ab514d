mod context_gathering;
